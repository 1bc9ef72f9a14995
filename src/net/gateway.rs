//! Default gateway detection.
//!
//! Published container ports are reachable on the host's default gateway
//! when the gateway itself runs inside a container.

use std::fs;
use std::net::Ipv4Addr;

const ROUTE_TABLE: &str = "/proc/net/route";

/// Default IPv4 gateway of this host, or loopback when it cannot be read.
pub fn default_gateway() -> Ipv4Addr {
    match fs::read_to_string(ROUTE_TABLE) {
        Ok(table) => match parse_route_table(&table) {
            Some(ip) => {
                tracing::debug!(gateway = %ip, "Detected default gateway");
                ip
            }
            None => {
                tracing::warn!("No default route found, using 127.0.0.1 as gateway");
                Ipv4Addr::LOCALHOST
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, path = ROUTE_TABLE, "Cannot read route table, using 127.0.0.1 as gateway");
            Ipv4Addr::LOCALHOST
        }
    }
}

/// Gateway of the first default route in `/proc/net/route` format.
///
/// Addresses are little-endian hex, so `0100A8C0` is `192.168.0.1`.
pub fn parse_route_table(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let mut fields = line.split_whitespace();
        let _iface = fields.next()?;
        let destination = fields.next()?;
        let gateway = fields.next()?;
        if destination != "00000000" {
            return None;
        }
        let raw = u32::from_str_radix(gateway, 16).ok()?;
        Some(Ipv4Addr::from(raw.to_le_bytes()))
    })
}
