pub mod responders;
pub mod socket_guard;
