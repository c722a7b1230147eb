use clap::{Parser, Subcommand};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use storefront_locale::config::Settings;
use storefront_locale::currency::{
    format_price, ConversionEndpoint, CurrencyCatalog, CurrencyConverter, RateChain,
};
use storefront_locale::clock::SystemClock;
use storefront_locale::location::{LocationData, LocationSession};

/// Storefront locale: visitor location, shipping context and currency
/// conversion.
///
/// Examples:
///   storefront serve
///   storefront detect
///   storefront set EG --country Egypt --city Cairo
///   storefront refresh
///   storefront convert 19.99 USD EGP
///   storefront currencies
#[derive(Parser)]
#[command(name = "storefront", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        /// Listen address, overriding STOREFRONT_BIND_ADDR.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Bootstrap the saved location (detecting if needed) and print the
    /// shipping context.
    Detect,

    /// Pin a location manually.
    Set {
        /// ISO 3166-1 alpha-2 code (e.g. EG, SE, US).
        country_code: String,

        /// Country display name. Looked up from the code when omitted.
        #[arg(long)]
        country: Option<String>,

        #[arg(long)]
        city: Option<String>,

        /// ISO 4217 currency override.
        #[arg(long)]
        currency: Option<String>,
    },

    /// Drop any manual override and detect again.
    Refresh,

    /// Convert an amount between currencies.
    Convert {
        #[arg(allow_hyphen_values = true)]
        amount: f64,
        from: String,
        to: String,

        /// Use the rate chain in-process instead of the storefront API.
        #[arg(long)]
        local: bool,
    },

    /// List supported currencies.
    Currencies,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvertOutput {
    formatted: String,
    #[serde(flatten)]
    result: storefront_locale::currency::ConversionResult,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = Settings::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command, settings).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command, mut settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Serve { bind } => {
            if let Some(addr) = bind {
                settings.bind_addr = addr;
            }
            eprintln!("  Storefront API listening on http://{}", settings.bind_addr);
            eprintln!("  Press Ctrl+C to stop.");
            storefront_locale::server::start(&settings).await?;
        }

        Command::Detect => {
            let mut session = LocationSession::from_settings(&settings);
            session.init().await?;
            print_json(&session.context().shipping_context())?;
        }

        Command::Set {
            country_code,
            country,
            city,
            currency,
        } => {
            let code = country_code.trim().to_ascii_uppercase();
            let name = country
                .or_else(|| {
                    storefront_locale::location::tables::country_name(&code).map(str::to_string)
                })
                .ok_or_else(|| format!("Unknown country code '{}'; pass --country", code))?;

            let mut location = LocationData::new(name, code);
            location.city = city;
            location.currency = currency;

            let mut session = LocationSession::from_settings(&settings);
            session.set_location_manually(location)?;
            print_json(&session.context().shipping_context())?;
        }

        Command::Refresh => {
            let mut session = LocationSession::from_settings(&settings);
            session.refresh_location().await?;
            print_json(&session.context().shipping_context())?;
        }

        Command::Convert {
            amount,
            from,
            to,
            local,
        } => {
            let converter = if local {
                let chain: Arc<dyn ConversionEndpoint> = Arc::new(RateChain::from_settings(&settings));
                CurrencyConverter::new(chain, settings.rate_ttl, Arc::new(SystemClock))
            } else {
                CurrencyConverter::from_settings(&settings)
            };

            let result = converter.convert(amount, &from, &to).await?;
            if let Some(warning) = &result.warning {
                eprintln!("  Warning: {}", warning);
            }
            print_json(&ConvertOutput {
                formatted: format_price(result.converted_amount, &to),
                result,
            })?;
        }

        Command::Currencies => {
            let list = CurrencyCatalog::from_settings(&settings).list().await;
            print_json(&list)?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
