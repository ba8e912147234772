pub mod error;
pub mod log;
pub mod repositories;
pub mod traits;

pub use error::RepositoryError;
pub use repositories::Repository;
pub(crate) use traits::{PaymentRepository, PaymentTransaction};
