pub mod repository;

pub(crate) use repository::{PaymentRepository, PaymentTransaction};
