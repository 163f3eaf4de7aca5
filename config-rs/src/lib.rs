//! config-rs/lib.rs
//! Shared configuration utilities for the change-assist services
//! Provides the layered `AppConfig` plus standardized port/address helpers

use std::env;
use std::net::{Ipv4Addr, SocketAddr};

pub mod settings;

pub use settings::{AppConfig, ConfigError};

/// Default port of the HTTP gateway
pub const API_GATEWAY_DEFAULT_PORT: u16 = 8282;

/// Port from `{NAME}_SERVICE_PORT`, falling back to `default_port` when unset or invalid
pub fn get_service_port(service_name: &str, default_port: u16) -> u16 {
    let var_name = format!("{}_SERVICE_PORT", service_name.to_uppercase());
    env::var(&var_name)
        .unwrap_or_else(|_| default_port.to_string())
        .parse::<u16>()
        .unwrap_or_else(|_| {
            log::warn!("Invalid port in {}, using default {}", var_name, default_port);
            default_port
        })
}

/// Create a SocketAddr for binding a service
///
/// `{NAME}_SERVICE_ADDR` wins when it holds a socket address, with or without
/// an `http://` / `https://` prefix. Otherwise binds all interfaces on the
/// port from [`get_service_port`].
pub fn get_bind_address(service_name: &str, default_port: u16) -> SocketAddr {
    let var_name = format!("{}_SERVICE_ADDR", service_name.to_uppercase());

    if let Ok(addr_str) = env::var(&var_name) {
        let trimmed = addr_str
            .strip_prefix("http://")
            .or_else(|| addr_str.strip_prefix("https://"))
            .unwrap_or(&addr_str);

        if let Ok(addr) = trimmed.parse::<SocketAddr>() {
            return addr;
        }
        log::warn!("Invalid address format in {}, using default", var_name);
    }

    let port = get_service_port(service_name, default_port);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}
