use {
    crate::CollectionRegistry,
    alloy_primitives::Address,
    chain::{ChainId, Family},
    serde::{Deserialize, Serialize},
};

/// An entry of the token list shown in the token selector.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    #[serde(default, rename = "logoURI", skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default)]
    pub is_collection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionMetadata>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "logoURI", skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// Attaches the registry logo to the collection entries of the token list.
///
/// Only chains of the Hyperliquid family are enriched. The result has the
/// same length and order as the input and applying it twice changes nothing.
pub fn enrich_tokens(
    tokens: &[TokenRecord],
    chain: ChainId,
    registry: &CollectionRegistry,
) -> Vec<TokenRecord> {
    if chain::family_of(chain) != Some(Family::Hyperliquid) {
        return tokens.to_vec();
    }
    tokens
        .iter()
        .map(|token| {
            let mut token = token.clone();
            if !token.is_collection {
                return token;
            }
            if let Some(info) = registry.get(chain, &token.address) {
                token.logo = Some(info.logo.clone());
                token.collection.get_or_insert_with(Default::default).logo =
                    Some(info.logo.clone());
            }
            token
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::CollectionInfo,
        alloy_primitives::address,
        chain::Chain,
        serde_json::json,
    };

    const HYPIO: Address = address!("abcdef0000000000000000000000000000000001");

    fn registry() -> CollectionRegistry {
        CollectionRegistry::new([(
            Chain::HyperEvm.id(),
            CollectionInfo {
                address: HYPIO,
                name: "Hypio".to_string(),
                symbol: "HYPIO".to_string(),
                logo: "https://logos.example/hypio.png".to_string(),
            },
        )])
    }

    fn tokens() -> Vec<TokenRecord> {
        serde_json::from_value(json!([
            {
                "address": "0x5555555555555555555555555555555555555555",
                "symbol": "WHYPE",
                "name": "Wrapped HYPE",
                "decimals": 18,
                "logoURI": "https://logos.example/whype.png",
            },
            {
                // Checksummed casing of the registry address.
                "address": "0xAbCdEf0000000000000000000000000000000001",
                "symbol": "HYPIO",
                "name": "Hypio",
                "decimals": 0,
                "isCollection": true,
                "collection": { "name": "Hypio" },
            },
            {
                "address": "0x6666666666666666666666666666666666666666",
                "symbol": "OTHER",
                "name": "Unknown collection",
                "decimals": 0,
                "isCollection": true,
            },
            {
                // Matches the registry but is not flagged as a collection.
                "address": "0xabcdef0000000000000000000000000000000001",
                "symbol": "HYPIO-W",
                "name": "Wrapped Hypio",
                "decimals": 18,
            },
        ]))
        .unwrap()
    }

    #[test]
    fn enriches_matching_collections_only() {
        let input = tokens();
        let output = enrich_tokens(&input, Chain::HyperEvm.id(), &registry());

        assert_eq!(output.len(), input.len());
        for (before, after) in input.iter().zip(&output) {
            assert_eq!(before.address, after.address);
            assert_eq!(before.symbol, after.symbol);
        }
        assert_eq!(output[0], input[0]);
        assert_eq!(
            output[1].logo.as_deref(),
            Some("https://logos.example/hypio.png")
        );
        assert_eq!(
            output[1].collection,
            Some(CollectionMetadata {
                name: Some("Hypio".to_string()),
                logo: Some("https://logos.example/hypio.png".to_string()),
            })
        );
        assert_eq!(output[2], input[2]);
        assert_eq!(output[3], input[3]);
    }

    #[test]
    fn enrichment_is_idempotent() {
        let registry = registry();
        let once = enrich_tokens(&tokens(), Chain::HyperEvm.id(), &registry);
        let twice = enrich_tokens(&once, Chain::HyperEvm.id(), &registry);
        assert_eq!(once, twice);
    }

    #[test]
    fn other_chain_families_pass_through() {
        let input = tokens();
        assert_eq!(enrich_tokens(&input, Chain::Ethereum.id(), &registry()), input);
        assert_eq!(enrich_tokens(&input, ChainId(12345), &registry()), input);
    }

    #[test]
    fn registry_is_scoped_by_chain() {
        // The testnet is a Hyperliquid chain but the collection is registered
        // on mainnet only.
        let input = tokens();
        assert_eq!(
            enrich_tokens(&input, Chain::HyperEvmTestnet.id(), &registry()),
            input
        );
    }

    #[test]
    fn empty_list() {
        assert!(enrich_tokens(&[], Chain::HyperEvm.id(), &registry()).is_empty());
    }
}
