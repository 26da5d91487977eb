pub mod config;
pub mod process;
pub mod result;
pub mod service;

pub use config::{MailerSettings, SupervisorConfig};
pub use process::ProcessRecord;
pub use result::{ServiceView, SupervisionResult};
pub use service::ServiceSpec;
