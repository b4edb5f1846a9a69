use {
    crate::{
        arguments::{Arguments, Command},
        hooks::Hooks,
        render,
        settings::{self, TransactionSettings, TransactionSettingsScope},
    },
    anyhow::{Context, Result},
    chain::{ChainContext, ChainId},
    clap::Parser,
    collections::{HyperliquidCollections, TokenRecord},
    query::QueryClient,
    reservoir::DefaultReservoirApi,
    serde::Serialize,
    std::sync::Arc,
    subgraph::DefaultSubgraphService,
    wallet::{ChainSwitchCoordinator, LocalWallet, Wallet},
};

pub async fn start(args: impl Iterator<Item = String>) {
    let args = Arguments::parse_from(args);
    let config = observe::Config::new(
        &args.logging.log_filter,
        args.logging.log_stderr_threshold,
        args.logging.use_json_logs,
    );
    observe::tracing::initialize(&config);
    observe::metrics::setup_registry(Some("nft_amm".into()));
    tracing::info!("running nft-amm with validated arguments:\n{}", args);

    let print_metrics = args.print_metrics;
    let result = run(args).await;
    if print_metrics {
        print!("{}", observe::metrics::encode(observe::metrics::get_registry()));
    }
    if let Err(err) = result {
        tracing::error!(?err, "command failed");
        std::process::exit(1);
    }
}

async fn run(args: Arguments) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(args.http_timeout)
        .build()
        .context("http client")?;

    let subgraph = DefaultSubgraphService::new(
        args.subgraph_urls
            .iter()
            .map(|endpoint| (endpoint.chain, endpoint.url.clone())),
        client.clone(),
    )?;
    let reservoir = args.reservoir_urls.iter().try_fold(
        DefaultReservoirApi::new(args.reservoir_api_key.clone(), client.clone()),
        |reservoir, endpoint| reservoir.with_base_url(endpoint.chain, endpoint.url.clone()),
    )?;
    let hooks = Hooks::new(
        QueryClient::with_capacity(args.query_cache_size),
        ChainContext::new(args.chain_id),
        Arc::new(subgraph),
        Arc::new(reservoir),
    );
    let settings = TransactionSettingsScope::new(
        TransactionSettings::new(args.slippage_bps, args.transaction_deadline)
            .context("transaction settings")?,
    );

    settings
        .run(execute(&args, hooks, client))
        .await
}

async fn execute(args: &Arguments, hooks: Hooks, client: reqwest::Client) -> Result<()> {
    let chain = hooks.chain().current();
    match &args.command {
        Command::Pairs => {
            let state = hooks.subgraph_all_pairs().load().await;
            print_json(&render::to_json(chain, &state))
        }
        Command::Pool { id } => {
            let state = hooks.pool_by_id(Some(*id)).load().await;
            print_json(&render::to_json(chain, &state))
        }
        Command::Currencies { collection } => {
            let state = hooks.collection_currencies(Some(*collection)).load().await;
            print_json(&render::to_json(chain, &state))
        }
        Command::PoolNfts {
            collection,
            token_ids,
        } => {
            let state = hooks.pool_nfts(*collection, token_ids.iter().copied()).load().await;
            print_json(&render::to_json(chain, &state))
        }
        Command::UserNfts { owner, collection } => {
            let state = hooks.user_nfts(*owner, *collection).load().await;
            print_json(&render::to_json(chain, &state))
        }
        Command::EnrichTokens { path } => {
            let tokens: Vec<TokenRecord> = serde_json::from_slice(
                &std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
            )
            .context("token list")?;
            let registry = HyperliquidCollections::new(
                args.hyperliquid_collections_url.clone(),
                client,
            )
            .load(chain)
            .await?;
            print_json(&collections::enrich_tokens(&tokens, chain, &registry))
        }
        Command::SwitchChain { to, wallet } => switch_chain(hooks, args, *to, *wallet).await,
        Command::Settings => {
            let settings = settings::transaction_settings()?.get();
            print_json(&settings)
        }
    }
}

/// Loads the pools before and after selecting `to`, keeping a wallet that is
/// connected on the startup chain in sync. The pools follow the selection on
/// their own.
async fn switch_chain(
    hooks: Hooks,
    args: &Arguments,
    to: ChainId,
    address: Option<alloy_primitives::Address>,
) -> Result<()> {
    let from = hooks.chain().current();
    let wallet = Arc::new(LocalWallet::default());
    let coordinator = ChainSwitchCoordinator::new(
        hooks.chain().clone(),
        wallet.clone(),
        args.configured_chains.clone(),
    );
    if let Some(address) = address {
        wallet.connect(address, from);
        coordinator.on_wallet_connected().await;
    }

    let pairs = Arc::new(hooks.subgraph_all_pairs());
    let before = pairs.load().await;
    let mut states = pairs.subscribe();
    let follower = pairs.clone().spawn();
    hooks.chain().select(to);
    let outcome = coordinator.sync().await;
    let after = if to == from {
        pairs.load().await
    } else {
        // Wait for the follower to settle the pairs of the new chain.
        states.changed().await?;
        states.wait_for(|state| !state.loading).await?.clone()
    };
    follower.abort();

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Output {
        before: serde_json::Value,
        after: serde_json::Value,
        wallet_chain: Option<ChainId>,
        wallet_switch: String,
    }
    print_json(&Output {
        before: render::to_json(from, &before),
        after: render::to_json(to, &after),
        wallet_chain: wallet.chain_id(),
        wallet_switch: format!("{outcome:?}"),
    })
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
