use std::net::{IpAddr, Ipv4Addr};

use get_if_addrs::get_if_addrs;

use crate::error::{IngestError, Result};

/// Name prefixes of bridges, tunnels and container links. Multicast IPTV
/// never arrives on these.
const VIRTUAL_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vboxnet", "tun", "tap", "utun", "wg", "zt",
    "dummy", "awdl", "llw",
];

const WIRED_PREFIXES: &[&str] = &["eth", "en", "em"];
const WIRELESS_PREFIXES: &[&str] = &["wl", "wifi", "ath"];

/// Resolve the local IPv4 address to join a multicast group on.
///
/// `hint` may be an IPv4 literal or an interface name. Without a hint the
/// best local interface is chosen (see [`pick_interface`]); if there is
/// none, `0.0.0.0` lets the kernel route the join.
pub fn select_ipv4(hint: Option<&str>) -> Result<Ipv4Addr> {
    if let Some(hint) = hint {
        if let Ok(addr) = hint.parse::<Ipv4Addr>() {
            return Ok(addr);
        }
        let ifaces = get_if_addrs()?;
        return ifaces
            .iter()
            .find_map(|iface| match iface.ip() {
                IpAddr::V4(v4) if iface.name == hint => Some(v4),
                _ => None,
            })
            .ok_or_else(|| IngestError::InterfaceNotFound(hint.to_string()));
    }

    let ifaces = match get_if_addrs() {
        Ok(ifaces) => ifaces,
        Err(e) => {
            tracing::warn!(error = %e, "interface enumeration failed, using default route");
            return Ok(Ipv4Addr::UNSPECIFIED);
        }
    };

    let candidates = ifaces.iter().filter_map(|iface| match iface.ip() {
        IpAddr::V4(v4) if !iface.is_loopback() => Some((iface.name.as_str(), v4)),
        _ => None,
    });

    match pick_interface(candidates) {
        Some((name, addr)) => {
            tracing::debug!(interface = name, %addr, "selected multicast interface");
            Ok(addr)
        }
        None => Ok(Ipv4Addr::UNSPECIFIED),
    }
}

/// Pick the best candidate: virtual interfaces are skipped, wired ones win
/// over unknown ones, which win over wireless. Ties keep enumeration order.
pub fn pick_interface<'a>(
    candidates: impl Iterator<Item = (&'a str, Ipv4Addr)>,
) -> Option<(&'a str, Ipv4Addr)> {
    candidates
        .enumerate()
        .filter_map(|(index, (name, addr))| rank(name).map(|r| ((r, index), (name, addr))))
        .min_by_key(|(key, _)| *key)
        .map(|(_, candidate)| candidate)
}

/// Lower is better; `None` excludes the interface.
fn rank(name: &str) -> Option<u8> {
    let has_prefix = |prefixes: &[&str]| prefixes.iter().any(|p| name.starts_with(p));
    if has_prefix(VIRTUAL_PREFIXES) {
        None
    } else if has_prefix(WIRED_PREFIXES) {
        Some(0)
    } else if has_prefix(WIRELESS_PREFIXES) {
        Some(2)
    } else {
        Some(1)
    }
}
