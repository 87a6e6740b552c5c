mod config;
mod panels;
mod source;

use std::{
    io::{BufRead, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use crowdcompass_genai::{GeminiModel, api_key_from_env};
use anyhow::anyhow;
use crowdcompass_logic::{
    Assistant, ContactBook, DensitySeries, EmergencyContact, FallbackPolicy, INCORRECT_CAPTCHA,
    LocationProvider, LoginChallenge, LoginForm, NOT_A_NUMBER, NotificationFeed, SAMPLE_INTERVAL,
    prelude::*,
};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    config::DashboardConfig,
    panels::{MapPanel, MeshPanel, RoutePanel, SosPanel, TerminalEvents},
    source::{ReplaySource, SharedSource},
};

#[derive(Parser)]
#[command(version, about = "Emergency response dashboard")]
struct Cli {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Position script to replay as the device location, without one geolocation is unavailable
    #[arg(long)]
    script: Option<PathBuf>,

    /// Keep the last good fix when a later reading fails instead of showing the default location
    #[arg(long)]
    keep_last_fix: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the shared location and show the map panel on every update
    Watch {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Suggest evacuation routes
    Routes {
        /// Current location as "lat, lng", defaults to the shared location
        #[arg(long)]
        location: Option<String>,
        /// Where you want to go, routes lead away from danger if unset
        #[arg(long)]
        destination: Option<String>,
        /// What is happening, defaults to the configured incident
        #[arg(long)]
        incident: Option<String>,
    },
    /// Send an SOS alert to emergency services and your contacts
    Sos,
    /// Broadcast a simulated offline mesh alert
    Mesh {
        /// Short message describing the reason for the alert
        message: String,
    },
    /// Show the simulated nearby crowd density
    Crowd {
        /// Number of extra samples to take after the initial window
        #[arg(long, default_value_t = 4)]
        samples: u32,
    },
    /// List emergency contacts, optionally changing them for this run
    Contacts {
        /// Add a contact: NAME RELATION PHONE
        #[arg(long, num_args = 3, value_names = ["NAME", "RELATION", "PHONE"])]
        add: Option<Vec<String>>,
        /// Remove the contact at this position in the list (starting at 1)
        #[arg(long, value_name = "N")]
        remove: Option<usize>,
    },
    /// Show the public safety notifications feed
    Notifications,
    /// Sign in to the dashboard, the CAPTCHA answer is read from stdin
    Login {
        /// Email or phone number
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
        /// Give up after this many wrong answers
        #[arg(long, default_value_t = 3)]
        attempts: u32,
    },
}

struct Dashboard {
    config: DashboardConfig,
    source: SharedSource,
    provider: LocationProvider,
    /// Fires on Ctrl-C, pending model requests are dropped
    cancel: CancellationToken,
}

impl Dashboard {
    fn new(config: DashboardConfig, source: SharedSource) -> Self {
        let provider = LocationProvider::start(
            source.clone(),
            config.location.clone(),
            TerminalEvents,
        );
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling pending requests");
                on_interrupt.cancel();
            }
        });
        Self {
            config,
            source,
            provider,
            cancel,
        }
    }

    fn assistant(&self) -> Result<Assistant<GeminiModel>> {
        let model = GeminiModel::new(
            api_key_from_env()?,
            self.config.base_url(),
            self.config.model(),
        )?;
        Ok(Assistant::new(model))
    }

    async fn watch(&self, seconds: Option<u64>) -> Result {
        let map = MapPanel::new(self.provider.handle()).with_overlay(self.config.incident.clone());
        let mut updates = self.provider.handle();
        let deadline = async {
            match seconds {
                Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        println!("{}", map.render());
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = &mut deadline => break,
                changed = updates.changed() => {
                    if !changed {
                        break;
                    }
                    println!("{}", map.render());
                }
            }
        }
        Ok(())
    }

    async fn routes(
        &self,
        location: Option<String>,
        destination: Option<String>,
        incident: Option<String>,
    ) -> Result {
        let assistant = self.assistant()?;
        let panel = RoutePanel::new(self.provider.handle());
        if location.is_none() {
            self.provider.handle().wait_until_ready().await;
        }
        let incident = incident.unwrap_or_else(|| self.config.incident.clone());

        let Some((crowd, suggestion)) = panel
            .suggest(&assistant, location, destination, &incident, &self.cancel)
            .await?
        else {
            warn!("Route request cancelled");
            return Ok(());
        };

        println!("Crowd density used:");
        for point in crowd.iter() {
            println!("  {:>4} people near {}", point.density, point.location);
        }
        println!("Suggested routes (safest first):");
        for (i, route) in suggestion.safe_routes.iter().enumerate() {
            println!("  {}. {route}", i + 1);
        }
        if let Some(url) = suggestion.crowd_density_map_image_url {
            println!("Density map: {url}");
        }
        Ok(())
    }

    async fn sos(&self) -> Result {
        let assistant = self.assistant()?;
        let panel = SosPanel::new(
            self.source.clone(),
            self.config.location.fallback,
            self.config.contact_book()?,
        );
        let alert = panel.trigger(&assistant).await?;
        println!(
            "[{}] SOS from {}",
            alert.sent_at.format("%H:%M:%S"),
            alert.coordinate.to_form_string()
        );
        println!("{}", alert.confirmation);
        Ok(())
    }

    async fn mesh(&self, message: &str) -> Result {
        let assistant = self.assistant()?;
        self.provider.handle().wait_until_ready().await;
        let mut panel = MeshPanel::new(self.provider.handle(), NotificationFeed::default());
        let Some(result) = panel.broadcast(&assistant, message, &self.cancel).await? else {
            warn!("Mesh broadcast cancelled");
            return Ok(());
        };
        println!("{}", result.confirmation_message);
        println!();
        print_notifications(panel.feed());
        Ok(())
    }

    fn crowd(&self, samples: u32) -> Result {
        let start = Utc::now();
        let seed = self
            .config
            .crowd_seed
            .unwrap_or_else(|| start.timestamp_millis() as u64);
        let step = TimeDelta::from_std(SAMPLE_INTERVAL).context("Bad sample interval")?;
        let mut series = DensitySeries::new(seed, start);
        for n in 1..=samples {
            series.advance(start + step * n as i32);
        }
        for sample in series.samples() {
            println!("{}  {:>3} {}", sample.time_label(), sample.density, bar(sample.density));
        }
        println!(
            "Now: {} people ({})",
            series.current().unwrap_or_default(),
            series.status()
        );
        Ok(())
    }

    fn contacts(&self, add: Option<Vec<String>>, remove: Option<usize>) -> Result {
        let mut book = self.config.contact_book()?;
        edit_contacts(&mut book, add, remove)?;
        print_contacts(&book);
        Ok(())
    }
}

fn edit_contacts(
    book: &mut ContactBook,
    add: Option<Vec<String>>,
    remove: Option<usize>,
) -> Result {
    if let Some(n) = remove {
        let index = n
            .checked_sub(1)
            .ok_or_else(|| anyhow!("Contact positions start at 1"))?;
        let removed = book.remove(index)?;
        info!("Removed {}", removed.name);
    }
    if let Some([name, relation, phone]) = add.as_deref() {
        book.add(EmergencyContact::new(name, relation, phone))?;
    }
    Ok(())
}

/// Ask the CAPTCHA on `out` and read answers from `input` until one is right
fn login(
    challenge: &mut LoginChallenge,
    mut form: LoginForm,
    mut input: impl BufRead,
    mut out: impl Write,
    attempts: u32,
) -> Result {
    for _ in 0..attempts {
        writeln!(out, "{}", challenge.question())?;
        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            break;
        }
        form.captcha = answer.trim().to_string();

        match challenge.submit(&form) {
            Ok(()) => {
                writeln!(out, "Login Successful")?;
                return Ok(());
            }
            Err(why) if why.to_string() == INCORRECT_CAPTCHA => {
                warn!("{why}: Please solve the math problem correctly.");
            }
            Err(why) if why.to_string() == NOT_A_NUMBER => warn!("{why}"),
            Err(why) => return Err(why),
        }
    }
    Err(anyhow!("Login failed"))
}

fn bar(density: u32) -> String {
    "#".repeat((density / 10) as usize)
}

fn print_notifications(feed: &NotificationFeed) {
    println!("Public safety notifications:");
    for n in feed.notifications() {
        let mesh = if n.is_mesh { " [mesh]" } else { "" };
        println!("  {}{mesh} - {} ({})", n.title, n.location, n.time);
        println!("    {}", n.description);
    }
}

fn print_contacts(book: &ContactBook) {
    for (i, contact) in book.contacts().iter().enumerate() {
        println!(
            "{}. {} ({}) - {}",
            i + 1,
            contact.name,
            contact.relation,
            contact.phone
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();

    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    if cli.keep_last_fix {
        config.location.policy = FallbackPolicy::KeepLastFix;
    }

    let source = match &cli.script {
        Some(path) => ReplaySource::from_file(path)?,
        None => {
            info!("No position script given, geolocation will be unavailable");
            ReplaySource::unsupported()
        }
    };

    let dashboard = Dashboard::new(config, Arc::new(source));

    let res = match cli.command {
        Commands::Watch { seconds } => dashboard.watch(seconds).await,
        Commands::Routes {
            location,
            destination,
            incident,
        } => dashboard.routes(location, destination, incident).await,
        Commands::Sos => dashboard.sos().await,
        Commands::Mesh { message } => dashboard.mesh(&message).await,
        Commands::Crowd { samples } => dashboard.crowd(samples),
        Commands::Contacts { add, remove } => dashboard.contacts(add, remove),
        Commands::Notifications => {
            print_notifications(&NotificationFeed::default());
            Ok(())
        }
        Commands::Login {
            user,
            password,
            attempts,
        } => {
            let seed = Utc::now().timestamp_millis() as u64;
            let form = LoginForm {
                email_or_phone: user,
                password,
                captcha: String::new(),
            };
            login(
                &mut LoginChallenge::new(seed),
                form,
                std::io::stdin().lock(),
                std::io::stdout(),
                attempts,
            )
        }
    };

    let Dashboard { provider, .. } = dashboard;
    provider.stop().await;

    if let Err(why) = &res {
        error!("{why:#}");
    }
    res
}
