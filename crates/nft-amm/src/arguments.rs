use {
    alloy_primitives::{Address, U256},
    anyhow::{Context, Result},
    chain::{Chain, ChainId},
    std::{
        fmt::{self, Display, Formatter},
        num::NonZeroUsize,
        path::PathBuf,
        str::FromStr,
        time::Duration,
    },
    url::Url,
};

#[macro_export]
macro_rules! logging_args_with_default_filter {
    ($struct_name:ident, $default_filter:literal) => {
        #[derive(clap::Parser)]
        pub struct $struct_name {
            #[clap(long, env, default_value = $default_filter)]
            pub log_filter: String,

            /// At which log level logs should be printed to stderr instead of
            /// stdout.
            #[clap(long, env)]
            pub log_stderr_threshold: Option<tracing::Level>,

            /// Whether to use JSON format for the logs.
            #[clap(long, env, default_value = "false")]
            pub use_json_logs: bool,
        }

        impl ::std::fmt::Display for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let Self {
                    log_filter,
                    log_stderr_threshold,
                    use_json_logs,
                } = self;

                writeln!(f, "log_filter: {}", log_filter)?;
                writeln!(f, "log_stderr_threshold: {:?}", log_stderr_threshold)?;
                writeln!(f, "use_json_logs: {}", use_json_logs)?;
                Ok(())
            }
        }
    };
}

logging_args_with_default_filter!(
    LoggingArguments,
    "warn,nft_amm=debug,query=debug,subgraph=debug,reservoir=debug,collections=debug,wallet=debug"
);

/// An endpoint of a service on one chain in the format `<CHAIN_ID>|<URL>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainEndpoint {
    pub chain: ChainId,
    pub url: Url,
}

impl FromStr for ChainEndpoint {
    type Err = anyhow::Error;

    fn from_str(endpoint: &str) -> Result<Self> {
        let (chain, url) = endpoint
            .split_once('|')
            .context("expected endpoint in the format <CHAIN_ID>|<URL>")?;
        Ok(Self {
            chain: chain.parse().context("invalid chain id")?,
            url: url.parse().context("invalid url")?,
        })
    }
}

impl Display for ChainEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.chain, self.url)
    }
}

#[derive(clap::Parser)]
#[clap(name = "nft-amm", about = "Chain-scoped pool and NFT data of the NFT AMM")]
pub struct Arguments {
    #[clap(flatten)]
    pub logging: LoggingArguments,

    /// The chain selected at startup.
    #[clap(long, env, default_value_t = Chain::HyperEvm.id())]
    pub chain_id: ChainId,

    /// Chains the wallet may be switched to.
    #[clap(
        long,
        env,
        value_delimiter = ',',
        default_value = "1,11155111,8453,42161,33139,999,998"
    )]
    pub configured_chains: Vec<ChainId>,

    /// Subgraph deployments in the format
    /// `<CHAIN_ID>|<URL>,<CHAIN_ID>|<URL>`. Chains without a deployment are
    /// not supported by the pool queries.
    #[clap(long, env, value_delimiter = ',')]
    pub subgraph_urls: Vec<ChainEndpoint>,

    /// Overrides or additions to the public Reservoir deployments in the
    /// format `<CHAIN_ID>|<URL>,<CHAIN_ID>|<URL>`.
    #[clap(long, env, value_delimiter = ',')]
    pub reservoir_urls: Vec<ChainEndpoint>,

    /// Sent as `x-api-key` to Reservoir.
    #[clap(long, env)]
    pub reservoir_api_key: Option<String>,

    /// JSON list of the Hyperliquid collections. The builtin list is used
    /// when unset.
    #[clap(long, env)]
    pub hyperliquid_collections_url: Option<Url>,

    /// Project id of the wallet connection service.
    #[clap(long, env = "WALLET_CONNECT_PROJECT_ID", default_value = "")]
    pub wallet_connect_project_id: String,

    /// Number of query results kept in memory. The least recently used
    /// results are evicted first.
    #[clap(long, env, default_value = "1000")]
    pub query_cache_size: NonZeroUsize,

    /// Timeout of every HTTP request to the external services.
    #[clap(long, env, default_value = "10s", value_parser = humantime::parse_duration)]
    pub http_timeout: Duration,

    /// Maximum slippage of swaps in basis points.
    #[clap(long, env, default_value = "50")]
    pub slippage_bps: u16,

    /// How long a submitted swap stays valid.
    #[clap(long, env, default_value = "20m", value_parser = humantime::parse_duration)]
    pub transaction_deadline: Duration,

    /// Print the collected metrics before exiting.
    #[clap(long, env)]
    pub print_metrics: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// All pools of the selected chain.
    Pairs,
    /// A single pool.
    Pool { id: Address },
    /// Currencies a collection is paired with.
    Currencies { collection: Address },
    /// Metadata of NFTs of a collection.
    PoolNfts {
        #[clap(long)]
        collection: Option<Address>,
        #[clap(long, value_delimiter = ',')]
        token_ids: Vec<U256>,
    },
    /// NFTs of a collection held by an owner.
    UserNfts {
        #[clap(long)]
        owner: Option<Address>,
        #[clap(long)]
        collection: Option<Address>,
    },
    /// Attach collection logos to a JSON token list.
    EnrichTokens { path: PathBuf },
    /// Select another chain, following with a connected wallet, and reload
    /// the pools.
    SwitchChain {
        to: ChainId,
        /// Connects a wallet with this address on the startup chain.
        #[clap(long)]
        wallet: Option<Address>,
    },
    /// The transaction settings in effect.
    Settings,
}

pub fn display_secret_option<T>(
    f: &mut Formatter<'_>,
    name: &str,
    option: &Option<T>,
) -> fmt::Result {
    display_option(f, name, &option.as_ref().map(|_| "SECRET"))
}

pub fn display_option(
    f: &mut Formatter<'_>,
    name: &str,
    option: &Option<impl Display>,
) -> fmt::Result {
    write!(f, "{name}: ")?;
    match option {
        Some(display) => writeln!(f, "{display}"),
        None => writeln!(f, "None"),
    }
}

pub fn display_list<T>(
    f: &mut Formatter<'_>,
    name: &str,
    iter: impl IntoIterator<Item = T>,
) -> fmt::Result
where
    T: Display,
{
    write!(f, "{name}: [")?;
    for (i, t) in iter.into_iter().enumerate() {
        if i != 0 {
            f.write_str(", ")?;
        }
        write!(f, "{t}")?;
    }
    writeln!(f, "]")?;
    Ok(())
}

// We have a custom Display implementation so that we can log the arguments on
// start up without leaking any potentially secret values.
impl Display for Arguments {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let Self {
            logging,
            chain_id,
            configured_chains,
            subgraph_urls,
            reservoir_urls,
            reservoir_api_key,
            hyperliquid_collections_url,
            wallet_connect_project_id,
            query_cache_size,
            http_timeout,
            slippage_bps,
            transaction_deadline,
            print_metrics,
            command: _,
        } = self;

        write!(f, "{logging}")?;
        writeln!(f, "chain_id: {chain_id}")?;
        display_list(f, "configured_chains", configured_chains)?;
        display_list(f, "subgraph_urls", subgraph_urls)?;
        display_list(f, "reservoir_urls", reservoir_urls)?;
        display_secret_option(f, "reservoir_api_key", reservoir_api_key)?;
        display_option(f, "hyperliquid_collections_url", hyperliquid_collections_url)?;
        writeln!(
            f,
            "wallet_connect_project_id: {}",
            if wallet_connect_project_id.is_empty() {
                "None"
            } else {
                "SECRET"
            }
        )?;
        writeln!(f, "query_cache_size: {query_cache_size}")?;
        writeln!(f, "http_timeout: {http_timeout:?}")?;
        writeln!(f, "slippage_bps: {slippage_bps}")?;
        writeln!(f, "transaction_deadline: {transaction_deadline:?}")?;
        writeln!(f, "print_metrics: {print_metrics}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::Parser};

    #[test]
    fn parse_chain_endpoint() {
        let endpoint: ChainEndpoint = "999|https://api.goldsky.com/subgraphs/nft-amm/gn"
            .parse()
            .unwrap();
        assert_eq!(
            endpoint,
            ChainEndpoint {
                chain: ChainId(999),
                url: Url::parse("https://api.goldsky.com/subgraphs/nft-amm/gn").unwrap(),
            }
        );
        assert_eq!(
            endpoint.to_string(),
            "999|https://api.goldsky.com/subgraphs/nft-amm/gn"
        );
    }

    #[test]
    fn reject_malformed_chain_endpoint() {
        assert!("https://example.com".parse::<ChainEndpoint>().is_err());
        assert!("hyperevm|https://example.com".parse::<ChainEndpoint>().is_err());
        assert!("999|not a url".parse::<ChainEndpoint>().is_err());
    }

    #[test]
    fn parse_arguments() {
        let args = Arguments::try_parse_from([
            "nft-amm",
            "--subgraph-urls",
            "999|http://localhost:8000/hyperevm,998|http://localhost:8000/testnet",
            "--reservoir-api-key",
            "super-secret",
            "pool-nfts",
            "--collection",
            "0x63eb9d77d083ca10c304e28d5191321977fd0bfb",
            "--token-ids",
            "3,1,2",
        ])
        .unwrap();

        assert_eq!(args.chain_id, ChainId(999));
        assert_eq!(args.subgraph_urls.len(), 2);
        assert_eq!(args.configured_chains.len(), 7);
        assert_eq!(args.query_cache_size.get(), 1000);
        assert_eq!(args.http_timeout, Duration::from_secs(10));
        assert_eq!(args.transaction_deadline, Duration::from_secs(20 * 60));
        match &args.command {
            Command::PoolNfts {
                collection,
                token_ids,
            } => {
                assert!(collection.is_some());
                assert_eq!(*token_ids, [3u64, 1, 2].map(U256::from));
            }
            _ => panic!("unexpected command"),
        }

        let displayed = args.to_string();
        assert!(displayed.contains("reservoir_api_key: SECRET"));
        assert!(!displayed.contains("super-secret"));
        assert!(displayed.contains("wallet_connect_project_id: None"));
    }
}
