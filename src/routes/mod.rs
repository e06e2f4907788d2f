pub mod appointments;
pub mod barbers;
pub mod clients;
pub mod login;
pub mod payments;
pub mod products;
pub mod register;
pub mod reports;
pub mod sales;
pub mod services;
pub mod specialties;
