pub mod capability;
pub mod invocation;
pub mod session;
