mod api;
mod catalog;
mod live;
mod render;
mod storefront;
mod talkdb;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bantuai_backend::config::ConsoleConfig;
use bantuai_backend::database::{
    NewTicket, Product, ProductCategory, ProductInput, ProductSegment, TicketCategory,
    TicketFilter, TicketPriority, TicketStatus, TicketUpdate,
};
use bantuai_backend::format::{format_currency, format_date, format_label, EMPTY_VALUE};
use bantuai_backend::store::{ConversationStore, TicketStore};
use bantuai_backend::webhook::AutomationWebhooks;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use api::StoreClient;
use catalog::{search_products, sort_products, ProductSortKey, SortDirection};
use live::{
    ConversationView, LinkedReset, LiveServices, SubmitOutcome, TicketResolver, ViewEvent,
};
use render::{conversation_row, render_timeline, ticket_row};
use storefront::{ChatRole, ChatSession, StorefrontChat};
use talkdb::{TalkDbConsole, SUGGESTED_QUESTIONS};

/// GadgetNusa customer-service console.
#[derive(Parser, Debug)]
#[command(name = "bantuai", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Headline counts and the most recent tickets.
    Dashboard,
    /// List conversations, newest first.
    Conversations {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// List tickets. Omitted filters match everything.
    Tickets {
        #[arg(long)]
        status: Option<TicketStatus>,
        #[arg(long)]
        category: Option<TicketCategory>,
        #[arg(long)]
        priority: Option<TicketPriority>,
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Product catalogue with search and sort.
    Products {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, value_enum, default_value_t = ProductSortKey::Name)]
        sort: ProductSortKey,
        #[arg(long, value_enum, default_value_t = SortDirection::Asc)]
        direction: SortDirection,
    },
    /// Show one product.
    Product { id: String },
    /// Add a product to the catalogue.
    AddProduct(ProductArgs),
    /// Replace a product's details.
    UpdateProduct {
        id: String,
        #[command(flatten)]
        product: ProductArgs,
    },
    /// Remove a product from the catalogue.
    DeleteProduct { id: String },
    /// Show one ticket.
    Ticket { id: String },
    /// Open a ticket by hand.
    CreateTicket {
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "general_inquiry")]
        category: TicketCategory,
        #[arg(long, default_value = "medium")]
        priority: TicketPriority,
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Move a ticket to another status.
    SetStatus { id: String, status: TicketStatus },
    /// Assign a ticket. An empty name clears the assignee.
    Assign { id: String, agent: String },
    /// Resolve a ticket and hand its conversation back to the assistant.
    Resolve { id: String },
    /// Live view of one conversation. Type a reply, or /take, /return, /refresh, /quit.
    Watch { conversation_id: String },
    /// Storefront chat widget. /new starts over, /quit leaves.
    Chat,
    /// Ask the database a question in plain language.
    Ask { query: Option<String> },
}

#[derive(Args, Debug)]
struct ProductArgs {
    #[arg(long)]
    sku: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    category: ProductCategory,
    #[arg(long)]
    brand: String,
    /// Whole Rupiah.
    #[arg(long)]
    price: i64,
    #[arg(long)]
    segment: Option<ProductSegment>,
    #[arg(long)]
    out_of_stock: bool,
}

impl ProductArgs {
    fn into_input(self) -> Result<ProductInput> {
        let input = ProductInput {
            sku: self.sku,
            name: self.name,
            category: self.category,
            brand: self.brand,
            price: self.price,
            segment: self.segment,
            in_stock: !self.out_of_stock,
        };
        if let Err(reason) = input.validate() {
            bail!(reason);
        }
        Ok(input)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bantuai=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConsoleConfig::load();
    let client = StoreClient::from_env(config.webhook_timeout())?;

    tracing::debug!("Backend API: {}", client.base_url());
    if std::env::var("BANTUAI_BACKEND_TOKEN")
        .ok()
        .map(|token| token.trim().is_empty())
        .unwrap_or(true)
    {
        tracing::warn!(
            "BANTUAI_BACKEND_TOKEN is unset/empty; requests will fail unless backend auth mode is disabled"
        );
    }

    match cli.command {
        Commands::Dashboard => show_dashboard(&client).await,
        Commands::Conversations { limit } => {
            for conversation in client.list_conversations(limit).await? {
                println!("{}", conversation_row(&conversation));
            }
            Ok(())
        }
        Commands::Tickets {
            status,
            category,
            priority,
            conversation,
            limit,
        } => {
            let filter = TicketFilter {
                status,
                category,
                priority,
                conversation_id: conversation,
                limit,
            };
            let tickets = client.list_tickets(&filter).await?;
            if tickets.is_empty() {
                println!("Tidak ada ticket yang cocok.");
            }
            for ticket in &tickets {
                println!("{}", ticket_row(ticket));
            }
            Ok(())
        }
        Commands::Products {
            search,
            sort,
            direction,
        } => {
            let mut products = search_products(client.list_products().await?, &search);
            sort_products(&mut products, sort, direction);
            for product in &products {
                println!("{}", product_row(product));
            }
            Ok(())
        }
        Commands::Product { id } => {
            let product = client
                .get_product(&id)
                .await?
                .with_context(|| format!("product '{}' not found", id))?;
            println!("{}", product_row(&product));
            println!(
                "  segment {}, added {}",
                product
                    .segment
                    .map(|segment| format_label(segment.as_str()))
                    .unwrap_or_else(|| EMPTY_VALUE.to_string()),
                format_date(Some(product.created_at))
            );
            Ok(())
        }
        Commands::AddProduct(args) => {
            let created = client.create_product(&args.into_input()?).await?;
            println!("{}", product_row(&created));
            Ok(())
        }
        Commands::UpdateProduct { id, product } => {
            let updated = client
                .update_product(&id, &product.into_input()?)
                .await?
                .with_context(|| format!("product '{}' not found", id))?;
            println!("{}", product_row(&updated));
            Ok(())
        }
        Commands::DeleteProduct { id } => {
            if !client.delete_product(&id).await? {
                bail!("product '{}' not found", id);
            }
            println!("Deleted product {}", id);
            Ok(())
        }
        Commands::Ticket { id } => {
            let ticket = client
                .get_ticket(&id)
                .await?
                .with_context(|| format!("ticket '{}' not found", id))?;
            println!("Ticket      {}", ticket.id);
            println!("Subject     {}", ticket.subject);
            println!("Customer    {}", ticket.customer_email);
            println!("Category    {}", format_label(ticket.category.as_str()));
            println!("Priority    {}", format_label(ticket.priority.as_str()));
            println!("Status      {}", format_label(ticket.status.as_str()));
            println!(
                "Assigned    {}",
                ticket.assigned_to.as_deref().unwrap_or(EMPTY_VALUE)
            );
            println!(
                "Conversation {}",
                ticket.conversation_id.as_deref().unwrap_or(EMPTY_VALUE)
            );
            println!("Created     {}", format_date(Some(ticket.created_at)));
            println!("Resolved    {}", format_date(ticket.resolved_at));
            if let Some(description) = ticket.description.as_deref() {
                println!();
                println!("{}", description);
            }
            Ok(())
        }
        Commands::CreateTicket {
            email,
            subject,
            category,
            priority,
            conversation,
            description,
        } => {
            let ticket = NewTicket {
                conversation_id: conversation,
                customer_email: email,
                category,
                priority,
                subject,
                description,
            };
            if let Err(reason) = ticket.validate() {
                bail!(reason);
            }
            let created = client.create_ticket(&ticket).await?;
            println!("{}", ticket_row(&created));
            Ok(())
        }
        Commands::SetStatus { id, status } => {
            let updated = client
                .save_ticket_update(&id, TicketUpdate::status_change(status, Utc::now()))
                .await?;
            println!("{}", ticket_row(&updated));
            Ok(())
        }
        Commands::Assign { id, agent } => {
            let updated = client
                .save_ticket_update(&id, TicketUpdate::assign(&agent))
                .await?;
            println!("{}", ticket_row(&updated));
            Ok(())
        }
        Commands::Resolve { id } => resolve_ticket(client, &id).await,
        Commands::Watch { conversation_id } => {
            let webhooks = AutomationWebhooks::from_config(&config)?;
            let services =
                LiveServices::from_config(Arc::new(client), Arc::new(webhooks), &config);
            watch_conversation(services, &conversation_id).await
        }
        Commands::Chat => {
            let webhooks = AutomationWebhooks::from_config(&config)?;
            storefront_chat(StorefrontChat::open(ChatSession::new(), Arc::new(webhooks))).await
        }
        Commands::Ask { query } => {
            let Some(query) = query.filter(|q| !q.trim().is_empty()) else {
                println!("Contoh pertanyaan:");
                for suggestion in SUGGESTED_QUESTIONS {
                    println!("  - {}", suggestion);
                }
                return Ok(());
            };
            let mut console = TalkDbConsole::new(client);
            if let Some(exchange) = console.ask(&query).await {
                println!("{}", exchange.answer);
            }
            Ok(())
        }
    }
}

fn product_row(product: &Product) -> String {
    format!(
        "{}  {:<12} {:<32} {:<10} {:<12} {:>16} {}",
        product.id,
        product.sku,
        product.name,
        product.brand,
        format_label(product.category.as_str()),
        format_currency(Some(product.price)),
        if product.in_stock { "tersedia" } else { "habis" },
    )
}

async fn show_dashboard(client: &StoreClient) -> Result<()> {
    let snapshot = client.dashboard().await?;
    println!("Total conversations  {}", snapshot.total_conversations);
    println!("Open tickets         {}", snapshot.open_tickets);
    println!("Resolved tickets     {}", snapshot.resolved_tickets);
    println!("Escalation rate      {:.1}%", snapshot.escalation_rate);

    println!();
    println!("Tickets by category");
    for entry in &snapshot.tickets_by_category {
        println!("  {:<18} {}", format_label(entry.category.as_str()), entry.count);
    }
    println!("Conversations by channel");
    for entry in &snapshot.conversations_by_channel {
        println!("  {:<18} {}", entry.channel, entry.count);
    }

    println!();
    println!("Recent tickets");
    for ticket in &snapshot.recent_tickets {
        println!("  {}", ticket_row(ticket));
    }
    Ok(())
}

async fn resolve_ticket(client: StoreClient, ticket_id: &str) -> Result<()> {
    let store = Arc::new(client);
    let tickets: Arc<dyn TicketStore> = store.clone();
    let conversations: Arc<dyn ConversationStore> = store;
    let resolution = TicketResolver::new(tickets, conversations)
        .resolve(ticket_id)
        .await?;

    println!("{}", ticket_row(&resolution.ticket));
    match resolution.linked {
        LinkedReset::NotLinked => {}
        LinkedReset::Reset(conversation) => {
            println!("Conversation {} returned to AI mode.", conversation.id);
        }
        LinkedReset::Failed(reason) => {
            eprintln!("Ticket resolved, but the conversation could not be reset: {}", reason);
        }
    }
    Ok(())
}

async fn watch_conversation(services: LiveServices, conversation_id: &str) -> Result<()> {
    let (events_tx, events_rx) = flume::unbounded();
    let mut view = ConversationView::open(services, conversation_id, events_tx).await?;
    println!(
        "Watching {} ({}, mode {})",
        view.conversation().id,
        view.conversation().customer_email,
        view.conversation().mode
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut last_rendered = String::new();

    loop {
        tokio::select! {
            event = events_rx.recv_async() => {
                let Ok(event) = event else { break };
                match event {
                    ViewEvent::TimelineChanged => {
                        let rendered = render_timeline(&view.entries(), view.mode_switch_index());
                        if rendered != last_rendered {
                            println!("{}", rendered);
                            last_rendered = rendered;
                        }
                    }
                    ViewEvent::HumanConnected => println!("* Human agent connected"),
                    ViewEvent::ModeChanged(mode) => println!("* Mode is now {}", mode),
                    ViewEvent::Notice(text) => eprintln!("! {}", text),
                    ViewEvent::NoticeCleared => {}
                }
            }
            line = stdin.next_line() => {
                let Some(mut line) = line.context("failed to read stdin")? else { break };
                match line.trim() {
                    "/quit" => break,
                    "/take" => {
                        if let Err(error) = view.take_over().await {
                            eprintln!("! {:#}", error);
                        }
                    }
                    "/return" => {
                        if let Err(error) = view.return_to_ai().await {
                            eprintln!("! {:#}", error);
                        }
                    }
                    "/refresh" => {
                        if let Err(error) = view.refresh_conversation().await {
                            eprintln!("! {:#}", error);
                        }
                    }
                    _ => match view.send_reply(&mut line) {
                        Ok(SubmitOutcome::Queued { client_id, .. }) => {
                            tracing::debug!("Queued reply {}", client_id);
                        }
                        Ok(SubmitOutcome::Ignored) => {}
                        Err(error) => eprintln!("! {:#}", error),
                    },
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    view.close().await;
    Ok(())
}

async fn storefront_chat(mut chat: StorefrontChat) -> Result<()> {
    tracing::debug!("Storefront session {}", chat.session_id());
    print_chat_lines(&chat, 0);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(mut line) = stdin.next_line().await.context("failed to read stdin")? {
        match line.trim() {
            "/quit" => break,
            "/new" => {
                chat.new_chat();
                print_chat_lines(&chat, 0);
            }
            _ => {
                let before = chat.lines().len();
                if chat.send(&mut line).await {
                    // the user's own line is already on screen
                    print_chat_lines(&chat, before + 1);
                    if let Some(error) = chat.error() {
                        eprintln!("! {}", error);
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_chat_lines(chat: &StorefrontChat, from: usize) {
    for line in chat.lines().iter().skip(from) {
        let speaker = match line.role {
            ChatRole::User => "Anda",
            ChatRole::Assistant => "BantuAI",
        };
        println!("{}: {}", speaker, line.text);
    }
}
