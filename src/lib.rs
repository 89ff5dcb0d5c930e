pub mod artifact;
pub mod error;
pub mod fleet;
pub mod instance;
pub mod ledger;
pub mod logging;
pub mod marker;
pub mod settings;
pub mod state;
#[doc(hidden)]
pub mod testing;
pub mod updater;
pub mod upstream;

pub use error::{AppError, AppResult};
pub use state::AppState;
