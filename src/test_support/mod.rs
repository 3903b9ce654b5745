//! Helpers shared by the library's unit tests.

pub mod socket_guard;
