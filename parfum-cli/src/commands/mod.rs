pub mod orders;
pub mod prizes;
pub mod run;
pub mod verify;

pub use orders::{handle_orders, handle_select};
pub use prizes::handle_prizes;
pub use run::handle_run;
pub use verify::handle_verify;
