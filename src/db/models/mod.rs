mod availability;
mod course;
mod enrollment;
mod payment;
mod session_request;
mod user;

pub use availability::*;
pub use course::*;
pub use enrollment::*;
pub use payment::*;
pub use session_request::*;
pub use user::*;
