//! Operations for the three MediaRenderer services
//!
//! Each submodule declares its actions with the operation macros and
//! provides any value helpers specific to that service.

pub mod av_transport;
pub mod connection_manager;
pub mod rendering_control;
