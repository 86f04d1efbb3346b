use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::MatchError;

/// Expand a `"start-end"` port range into the individual port numbers,
/// inclusive on both ends, as decimal strings.
///
/// # Errors
///
/// Returns [`MatchError`] if the string has no `-` separator or either
/// bound fails to parse as an integer. No bounds validation is applied
/// beyond parseability.
pub fn expand_port_range(port_range: &str) -> Result<Vec<String>, MatchError> {
    let (start, end) = port_range
        .split_once('-')
        .ok_or_else(|| MatchError::MalformedPortRange {
            range: port_range.to_owned(),
        })?;
    let start: u32 = parse_port_number(start, port_range)?;
    let end: u32 = parse_port_number(end, port_range)?;
    Ok((start..=end).map(|port| port.to_string()).collect())
}

fn parse_port_number(port: &str, range: &str) -> Result<u32, MatchError> {
    port.parse().map_err(|_| MatchError::InvalidPortNumber {
        range: range.to_owned(),
        port: port.to_owned(),
    })
}

/// Expand every port entry in a list: entries containing `-` expand as
/// ranges, everything else passes through unchanged. An empty input yields
/// an empty output.
///
/// # Errors
///
/// Returns [`MatchError`] if a range entry fails to expand.
pub fn expand_ports(ports: &[String]) -> Result<Vec<String>, MatchError> {
    let mut expanded = Vec::new();
    for port in ports {
        if port.contains('-') {
            expanded.extend(expand_port_range(port)?);
        } else {
            expanded.push(port.clone());
        }
    }
    Ok(expanded)
}

/// Whether the network described by `ip_addr` is wholly contained in
/// `ip_range`. Bare addresses are treated as host networks (/32 for v4,
/// /128 for v6).
///
/// # Errors
///
/// Returns [`MatchError`] if either string parses as neither a network
/// nor an address.
pub fn ip_in_range(ip_addr: &str, ip_range: &str) -> Result<bool, MatchError> {
    let network = parse_network(ip_addr)?;
    let range = parse_network(ip_range)?;
    Ok(range.contains(&network))
}

/// Whether every entry of `ips` is contained in at least one entry of
/// `ranges`. Vacuously true when `ips` is empty; false when `ips` is
/// non-empty but `ranges` is empty.
///
/// # Errors
///
/// Returns [`MatchError`] on the first unparseable address in either list.
pub fn ips_in_list(ips: &[String], ranges: &[String]) -> Result<bool, MatchError> {
    if ips.is_empty() {
        return Ok(true);
    }
    if ranges.is_empty() {
        return Ok(false);
    }
    for ip_addr in ips {
        let mut contained = false;
        for range in ranges {
            if ip_in_range(ip_addr, range)? {
                contained = true;
                break;
            }
        }
        if !contained {
            return Ok(false);
        }
    }
    Ok(true)
}

fn parse_network(addr: &str) -> Result<IpNet, MatchError> {
    if let Ok(network) = addr.parse::<IpNet>() {
        return Ok(network);
    }
    addr.parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| MatchError::InvalidIpNetwork {
            addr: addr.to_owned(),
        })
}
