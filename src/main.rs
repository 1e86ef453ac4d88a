use std::process;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use zakupki_matcher::crawlers::citilink::CitilinkStore;
use zakupki_matcher::crawlers::zakupki::ZakupkiCatalog;
use zakupki_matcher::models::config::AppConfig;
use zakupki_matcher::processing::embedding::FastembedProvider;
use zakupki_matcher::processing::{
    CancelToken, Disambiguation, Outcome, PhasePayload, Session, SessionEnd,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let json_output = args.iter().any(|arg| arg == "--json");
    let product_name = match args.iter().find(|arg| !arg.starts_with("--")) {
        Some(name) => name.clone(),
        None => {
            eprintln!("Usage: zakupki-matcher [--json] <product name>");
            process::exit(2);
        }
    };

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let embedder = match FastembedProvider::new() {
        Ok(embedder) => embedder,
        Err(e) => {
            log::error!("Failed to initialize the embedding model: {e}");
            process::exit(1);
        }
    };

    let retail = match CitilinkStore::new(&config.citilink_url, config.concurrency) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to build the citilink crawler: {e}");
            process::exit(1);
        }
    };

    let catalog = match ZakupkiCatalog::new(&config.zakupki_url, config.concurrency) {
        Ok(catalog) => catalog,
        Err(e) => {
            log::error!("Failed to build the procurement crawler: {e}");
            process::exit(1);
        }
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (selections_tx, selections_rx) = mpsc::unbounded_channel();
    let cancel = CancelToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Stop requested");
                cancel.cancel();
            }
        });
    }

    let mut session = Session::new(retail, catalog, embedder, events_tx, selections_rx, cancel);
    let worker = {
        let product_name = product_name.clone();
        tokio::spawn(async move { session.run(&product_name).await })
    };

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    while let Some(report) = events_rx.recv().await {
        match report.outcome {
            Outcome::Success(payload) => render_success(payload, json_output),
            Outcome::Fail(disambiguation) => {
                match prompt_selection(&mut stdin, &disambiguation).await {
                    Some(href) => {
                        if selections_tx.send(href).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            Outcome::Stopped => {
                log::warn!("Stopped during {:?}", report.phase);
                break;
            }
        }
    }

    match worker.await {
        Ok(Ok(SessionEnd::Completed)) => log::info!("Search finished"),
        Ok(Ok(SessionEnd::Stopped)) => log::info!("Search stopped"),
        Ok(Err(e)) => {
            log::error!("Session failed: {e}");
            process::exit(1);
        }
        Err(e) => {
            log::error!("Session task failed: {e}");
            process::exit(1);
        }
    }
}

fn render_success(payload: PhasePayload, json_output: bool) {
    match payload {
        PhasePayload::RetailUrl(url) => println!("Товар: {url}"),
        PhasePayload::RetailProduct { name, price, .. } => {
            println!("Модель: {}", name.split(',').next().unwrap_or(&name));
            println!("Цена: {price}");
        }
        PhasePayload::CatalogEntry { url, name } => {
            println!("Госзакупки: {name}");
            println!("URL: {url}");
        }
        PhasePayload::CatalogAttributes { records, matches } => {
            for record in &records {
                let value = if record.default_value.is_empty() {
                    "—"
                } else {
                    &record.default_value
                };
                if record.description.is_empty() {
                    println!("{}: {value}", record.name);
                } else {
                    println!("{}: {value} [{}]", record.name, record.description);
                }
            }
            log::info!("Linked characteristics: {}", matches.len());
            if json_output {
                match serde_json::to_string_pretty(&records) {
                    Ok(json) => println!("{json}"),
                    Err(e) => log::warn!("Failed to serialize characteristics: {e}"),
                }
            }
        }
    }
}

/// Lists the sub-entries and reads the user's pick from stdin. Returns the
/// chosen entry's href, or `None` when stdin is closed.
async fn prompt_selection(
    stdin: &mut Lines<BufReader<Stdin>>,
    disambiguation: &Disambiguation,
) -> Option<String> {
    println!("Выберите {}:", disambiguation.category);
    for (index, entry) in disambiguation.entries.iter().enumerate() {
        println!("  {}. {}", index + 1, entry.key);
    }
    loop {
        let line = stdin.next_line().await.ok().flatten()?;
        match line.trim().parse::<usize>() {
            Ok(choice) if (1..=disambiguation.entries.len()).contains(&choice) => {
                return Some(disambiguation.entries[choice - 1].href.clone());
            }
            _ => println!("Введите номер от 1 до {}", disambiguation.entries.len()),
        }
    }
}
