//! Transport layer for the Docker volume plugin protocol.
//!
//! This module provides [`PluginServer`], which serves a
//! [`VolumeDriver`](crate::driver::VolumeDriver) over HTTP on a Unix socket.

pub mod server;

pub use server::{PluginServer, socket_path};
