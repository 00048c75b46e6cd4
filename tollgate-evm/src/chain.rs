//! CAIP-2 network identifier helpers for EIP-155 chains.

/// Parses an `eip155:<id>` CAIP-2 identifier into a numeric chain id.
#[must_use]
pub fn parse_caip2(network: &str) -> Option<u64> {
    let reference = network.strip_prefix("eip155:")?;
    reference.parse().ok()
}

/// Formats a numeric chain id as its `eip155:<id>` CAIP-2 identifier.
#[must_use]
pub fn caip2(chain_id: u64) -> String {
    format!("eip155:{chain_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caip2_round_trips() {
        assert_eq!(parse_caip2("eip155:84532"), Some(84532));
        assert_eq!(parse_caip2(&caip2(8453)), Some(8453));
        assert_eq!(parse_caip2("solana:mainnet"), None);
        assert_eq!(parse_caip2("eip155:not-a-number"), None);
    }
}
