//! Service Framework (SF) for the sys-clk IPC stack.
//!
//! This crate implements the Horizon OS IPC serialization layers that the
//! sys-clk client and daemon speak to each other:
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  sys-clk / sm commands      │  Application layer
//! ├─────────────────────────────┤
//! │  CMIF                       │  Command serialization (SF layer)
//! ├─────────────────────────────┤
//! │  HIPC                       │  Message framing & descriptors
//! ├─────────────────────────────┤
//! │  Kernel                     │  Transport (SendSyncRequest, etc)
//! └─────────────────────────────┘
//! ```
//!
//! Messages are built in a [`MessageBuffer`] owned by the caller, one per
//! in-flight request. The transport underneath is the [`Kernel`] trait:
//! on hardware it issues the real supervisor calls, in tests it routes
//! messages to in-process servers.
//!
//! Both directions are covered: clients build requests and parse responses,
//! servers parse requests and build responses.

#![no_std]

extern crate alloc;

mod buffer;
pub mod cmif;
pub mod hipc;
pub mod kernel;
pub mod result;
pub mod service;
mod service_name;

pub use self::{
    buffer::{MESSAGE_BUFFER_SIZE, MessageBuffer},
    kernel::{Handle, Kernel, RawHandle},
    result::{Error, ResultCode},
    service::Service,
    service_name::ServiceName,
};
