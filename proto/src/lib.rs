//! Generated gRPC types and service stubs for the `session.v1` package.
//!
//! All messages are compiled from the `.proto` files in this crate's root by
//! `build.rs`; see those files for field-level documentation.

pub mod session {
    pub mod v1 {
        tonic::include_proto!("session.v1");
    }
}
