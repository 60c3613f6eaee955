use std::{process, sync::Arc};

use layout_flush::{
    config::{self, Command, FeedSettings, Settings},
    error::AppError,
    feed::ChangeFeed,
    infra::{lines, store::LocalCacheStore, telemetry},
    invalidation::{ChangeEvent, InvalidationConfig, InvalidationDispatcher, KeyRole},
};
use tokio::{io::BufReader, sync::watch};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(Command::Watch(Box::<config::WatchArgs>::default()));

    telemetry::init(&settings.logging)?;

    let dispatcher = Arc::new(build_dispatcher(&settings)?);

    match command {
        Command::Watch(_) => run_watch(&settings.feed, dispatcher).await,
        Command::Resolve(args) => {
            run_resolve(&dispatcher, &args.paths);
            Ok(())
        }
        Command::Plan(args) => {
            run_plan(&dispatcher, &args.paths);
            Ok(())
        }
    }
}

fn build_dispatcher(settings: &Settings) -> Result<InvalidationDispatcher, AppError> {
    let config = Arc::new(InvalidationConfig::from(&settings.invalidation));
    let store = Arc::new(LocalCacheStore::new(settings.store.capacity));
    let dispatcher = InvalidationDispatcher::new(config, store)?;
    info!(
        pattern = dispatcher.resolver().pattern(),
        keys_per_page = dispatcher.config().keys_per_page(),
        "Invalidation dispatcher ready"
    );
    Ok(dispatcher)
}

async fn run_watch(
    feed_settings: &FeedSettings,
    dispatcher: Arc<InvalidationDispatcher>,
) -> Result<(), AppError> {
    let feed = Arc::new(ChangeFeed::new(feed_settings.queue_capacity.get()));
    let subscription = dispatcher.subscribe(&feed);
    let batch_limit = feed_settings.batch_limit.get();

    // Periodic delivery; stops between batches once stdin is exhausted.
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let delivery_feed = Arc::clone(&feed);
    let interval_period = feed_settings.deliver_interval;
    let delivery_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval_period);
        interval.tick().await; // Skip the first immediate tick
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    delivery_feed.deliver(batch_limit).await;
                }
                _ = stop_rx.changed() => break,
            }
        }
    });

    info!(subscription = %subscription, "Watching stdin for change events");
    let read_result =
        lines::read_changes(BufReader::new(tokio::io::stdin()), &feed, batch_limit).await;

    let _ = stop_tx.send(true);
    delivery_handle
        .await
        .map_err(|err| AppError::unexpected(format!("delivery task failed: {err}")))?;

    let flushed = feed.flush(batch_limit).await;
    feed.unsubscribe(subscription);

    let summary = read_result?;
    info!(
        lines = summary.lines,
        published = summary.published,
        delivered_while_reading = summary.delivered,
        dropped = summary.dropped,
        malformed = summary.malformed,
        flushed,
        "Change stream closed"
    );
    println!(
        "lines={} published={} dropped={} malformed={} delivered={}",
        summary.lines,
        summary.published,
        summary.dropped,
        summary.malformed,
        summary.delivered + flushed
    );
    Ok(())
}

fn run_resolve(dispatcher: &InvalidationDispatcher, paths: &[String]) {
    for path in paths {
        match dispatcher.resolver().resolve(path) {
            Some(page) => println!("{path}\t{page}"),
            None => println!("{path}\t-"),
        }
    }
}

fn run_plan(dispatcher: &InvalidationDispatcher, paths: &[String]) {
    let events: Vec<ChangeEvent> = paths
        .iter()
        .map(|path| ChangeEvent::changed(path.as_str()))
        .collect();

    let plan = dispatcher.plan(&events);
    info!(plan = %plan, "Planned invalidation");

    for planned in dispatcher.planned_keys(&events) {
        println!(
            "{}\t{}\t{}",
            planned.page,
            role_label(&planned.role),
            planned.key
        );
    }
}

fn role_label(role: &KeyRole) -> String {
    match role {
        KeyRole::Base => "base".to_string(),
        KeyRole::Variant { value } => format!("variant:{value}"),
        KeyRole::Extension { name } => format!("extension:{name}"),
    }
}
