//! Interface adapters exposing the services to users.

pub mod cli;
