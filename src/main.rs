//! OpenSASE Storefront - cart command line client

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opensase_storefront::domain::{Address, Cart, CountryCode, PromoCode, VariantSummary};
use opensase_storefront::{CartSync, CartUpdate, FileSessionStore, StoreClient, StorefrontConfig};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "opensase-storefront", about = "Work with the shopper's cart from the terminal")]
struct Cli {
    /// Store API base url, overrides STOREFRONT_BACKEND_URL.
    #[arg(long, env = "STOREFRONT_BACKEND_URL")]
    backend_url: Option<String>,
    /// Session file, overrides STOREFRONT_SESSION_PATH.
    #[arg(long)]
    session: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the current cart.
    Show,
    /// Add a variant to the cart, creating the cart if needed.
    Add {
        #[arg(long)]
        variant: String,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        /// Unit price shown until the backend confirms.
        #[arg(long)]
        price: Decimal,
        #[arg(long, default_value = "Item")]
        title: String,
        #[arg(long)]
        country: Option<String>,
    },
    /// Change a line's quantity; 0 removes it.
    Update { line_id: String, quantity: u32 },
    /// Remove a line.
    Remove { line_id: String },
    /// Apply a promotion code.
    Promo { code: String },
    /// Remove a promotion code.
    Unpromo { code: String },
    /// Move the shopper (and cart) to another country's region.
    Region { country: String },
    /// Set the email and shipping address.
    Details {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        postal_code: Option<String>,
        #[arg(long)]
        country: Option<String>,
    },
    /// List shipping options for the cart.
    Shipping,
    /// Select a shipping option.
    Ship { option_id: String },
    /// Place the order.
    Complete,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = StorefrontConfig::from_env()?;
    if let Some(url) = cli.backend_url { config.backend_url = url; }
    if let Some(path) = cli.session { config.session_path = path; }

    let client = StoreClient::new(&config)?;
    let sync = CartSync::new(client, FileSessionStore::new(&config.session_path), &config)?;
    tracing::debug!(backend = %config.backend_url, "storefront client ready");

    match cli.command {
        Command::Show => match sync.retrieve().await? {
            Some(cart) => print_cart(&cart),
            None => println!("No cart yet."),
        },
        Command::Add { variant, quantity, price, title, country } => {
            let country = match country {
                Some(code) => CountryCode::new(code)?,
                None => sync.preferred_country(),
            };
            let cart = sync.add_item(VariantSummary::new(variant, title, price), quantity, &country).await?;
            print_cart(&cart);
        }
        Command::Update { line_id, quantity } => print_cart(&sync.update_item(&line_id, quantity).await?),
        Command::Remove { line_id } => print_cart(&sync.remove_item(&line_id).await?),
        Command::Promo { code } => print_cart(&sync.apply_promotions(&[PromoCode::new(code)?]).await?),
        Command::Unpromo { code } => print_cart(&sync.remove_promotion(&PromoCode::new(code)?).await?),
        Command::Region { country } => {
            let country = CountryCode::new(country)?;
            match sync.set_region(&country).await? {
                Some(cart) => print_cart(&cart),
                None => println!("Region set to {country}."),
            }
        }
        Command::Details { email, address, city, postal_code, country } => {
            let shipping_address = (address.is_some() || city.is_some()).then(|| Address {
                address_1: address,
                city,
                postal_code,
                country_code: country,
                ..Address::default()
            });
            let cart = sync.update_details(CartUpdate { email, shipping_address, ..CartUpdate::default() }).await?;
            print_cart(&cart);
        }
        Command::Shipping => {
            for option in sync.shipping_options().await? {
                println!("{}  {}  {}", option.id, option.name, option.amount);
            }
        }
        Command::Ship { option_id } => print_cart(&sync.set_shipping_method(&option_id).await?),
        Command::Complete => {
            let order = sync.complete().await.context("checkout did not complete")?;
            let number = order.display_id.map_or_else(|| order.id.clone(), |n| n.to_string());
            println!("Order {number} placed: {} {}", order.total, order.currency_code.to_uppercase());
        }
    }
    Ok(())
}

fn print_cart(cart: &Cart) {
    let currency = cart.currency_code.to_uppercase();
    println!("Cart {} ({currency})", cart.id);
    for item in cart.items() {
        println!("  {:<28} {:>3} x {:>10} = {:>10}   [{}]", item.title, item.quantity, item.unit_price, item.total, item.id);
    }
    for promotion in &cart.promotions {
        println!("  promotion {}", promotion.code);
    }
    println!("  items     {:>10}", cart.item_count());
    println!("  subtotal  {:>10}", cart.subtotal);
    println!("  shipping  {:>10}", cart.shipping_total);
    println!("  discount  {:>10}", cart.discount_total);
    println!("  tax       {:>10}", cart.tax_total);
    println!("  total     {:>10} {currency}", cart.total);
}
