//! NFT collection metadata and token list enrichment for Hyperliquid chains.

mod enrich;
mod registry;

pub use {
    enrich::{CollectionMetadata, TokenRecord, enrich_tokens},
    registry::{CollectionInfo, CollectionRegistry, HyperliquidCollections},
};
