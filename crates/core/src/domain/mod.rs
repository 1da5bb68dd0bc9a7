pub mod contract;
pub mod instance;
pub mod org;
pub mod role;
pub mod scenario;
pub mod user;
