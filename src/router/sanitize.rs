//! Header sanitization for outbound calls and logs (spec §4.3 step 3).

const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-api-key"];

pub const FORWARDED_BY_HEADER: &str = "x-forwarded-by";
pub const FORWARDED_BY_VALUE: &str = "order-control-plane-rrr";
pub const USER_AGENT_VALUE: &str = "order-control-plane-rrr/1.0";

/// Strip sensitive headers before forwarding downstream, and before logging.
pub fn sanitize_for_log(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()))
        .cloned()
        .collect()
}

/// Build the outbound header set: inbound headers minus sensitive ones, plus
/// a user-agent and forwarding marker.
pub fn build_outbound_headers(inbound: &[(String, String)]) -> Vec<(String, String)> {
    let mut out = sanitize_for_log(inbound);
    out.push(("user-agent".to_string(), USER_AGENT_VALUE.to_string()));
    out.push((FORWARDED_BY_HEADER.to_string(), FORWARDED_BY_VALUE.to_string()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_authorization_and_cookies() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer secret".to_string()),
            ("Cookie".to_string(), "session=abc".to_string()),
            ("X-Correlation-ID".to_string(), "cid-1".to_string()),
        ];
        let out = build_outbound_headers(&headers);
        assert!(out.iter().all(|(n, _)| n != "Authorization" && n != "Cookie"));
        assert!(out.iter().any(|(n, v)| n == "x-correlation-id" || (n == "X-Correlation-ID" && v == "cid-1")));
        assert!(out.iter().any(|(n, _)| n == FORWARDED_BY_HEADER));
    }
}
