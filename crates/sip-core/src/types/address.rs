//! Helpers for SIP address values.
//!
//! Accepts name-addr (`"Alice" <sip:alice@example.com>;tag=1`), bare SIP or
//! SIPS URIs and tel URIs. Only the pieces the IMS core needs are extracted;
//! this is not a full RFC 3261 URI parser.

use crate::error::{Error, Result};

/// Returns the URI part of an address, without angle brackets or header
/// parameters.
pub fn extract_uri(address: &str) -> Result<&str> {
    let address = address.trim();
    if let Some(start) = address.find('<') {
        let rest = &address[start + 1..];
        let end = rest
            .find('>')
            .ok_or_else(|| Error::InvalidAddress(address.to_string()))?;
        return Ok(rest[..end].trim());
    }
    // addr-spec without brackets: parameters belong to the header
    let end = address.find(';').unwrap_or(address.len());
    let uri = address[..end].trim();
    if uri.is_empty() {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    Ok(uri)
}

fn strip_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once(':')?;
    let scheme = scheme.trim();
    if scheme.eq_ignore_ascii_case("sip") || scheme.eq_ignore_ascii_case("sips") || scheme.eq_ignore_ascii_case("tel") {
        Some((scheme, rest))
    } else {
        None
    }
}

/// True when the address carries a tel URI
pub fn is_tel_uri(address: &str) -> bool {
    extract_uri(address)
        .ok()
        .and_then(strip_scheme)
        .map_or(false, |(scheme, _)| scheme.eq_ignore_ascii_case("tel"))
}

/// Username of a SIP URI, or the number of a tel URI (global numbers keep
/// their leading `+`).
pub fn extract_username_from_address(address: &str) -> Result<String> {
    let uri = extract_uri(address)?;
    let (scheme, rest) = strip_scheme(uri).ok_or_else(|| Error::InvalidAddress(address.to_string()))?;
    let rest = rest.split(';').next().unwrap_or(rest);

    if scheme.eq_ignore_ascii_case("tel") {
        if rest.is_empty() {
            return Err(Error::InvalidAddress(address.to_string()));
        }
        return Ok(rest.to_string());
    }

    let user = match rest.split_once('@') {
        Some((userinfo, _)) => userinfo.split(':').next().unwrap_or(userinfo),
        None => return Err(Error::InvalidAddress(address.to_string())),
    };
    if user.is_empty() {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    Ok(user.to_string())
}

/// Host part of a SIP URI. Tel URIs have none.
pub fn extract_domain_from_address(address: &str) -> Option<String> {
    let uri = extract_uri(address).ok()?;
    let (scheme, rest) = strip_scheme(uri)?;
    if scheme.eq_ignore_ascii_case("tel") {
        return None;
    }
    let hostport = match rest.split_once('@') {
        Some((_, host)) => host,
        None => rest,
    };
    let host = hostport.split([';', '?']).next().unwrap_or(hostport);
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Display name of a name-addr, unquoted
pub fn extract_display_name(address: &str) -> Option<String> {
    let address = address.trim();
    let bracket = address.find('<')?;
    let name = address[..bracket].trim();
    let name = name
        .strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .unwrap_or(name)
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Splits a header holding a comma-separated list of addresses, ignoring
/// commas inside quotes or angle brackets.
pub fn split_address_list(value: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut in_quotes = false;
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in value.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => depth += 1,
            '>' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                let item = value[start..idx].trim();
                if !item.is_empty() {
                    items.push(item);
                }
                start = idx + 1;
            }
            _ => {}
        }
    }
    let last = value[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    items
}
