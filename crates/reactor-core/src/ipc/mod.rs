//! IPC envelope shared between the kernel process and its coordinator.

pub mod protocol;

pub use protocol::{
    Channel, KernelRequest, Notification, Output, Status, read_message, write_message,
};
