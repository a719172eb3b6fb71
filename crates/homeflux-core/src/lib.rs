pub mod controller;
pub mod error;

pub use controller::HomeController;
pub use error::{CoreError, Result};
