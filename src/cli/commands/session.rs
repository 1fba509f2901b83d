//! Session commands

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use crate::cli::context::CommandContext;
use crate::cli::output::{OutputFormat, format_sessions, print_formatted, print_success};
use crate::client::ClientError;
use crate::poller::PollOutcome;
use crate::session::{Session, SessionIdentity};
use crate::session_types::{self, SessionTypeMap};
use crate::watch::WaitTarget;

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List active sessions
    List,

    /// Launch a new session and wait for it to run
    Launch {
        /// Session name
        #[arg(long)]
        name: String,

        /// Session type (notebook, desktop, carta)
        #[arg(long = "type")]
        session_type: Option<String>,

        /// Container image (defaults to the first image for the type)
        #[arg(long)]
        image: Option<String>,

        /// Number of cores
        #[arg(long)]
        cores: Option<u32>,

        /// Memory in GB
        #[arg(long)]
        ram: Option<u32>,

        /// Return once the request is accepted
        #[arg(long)]
        no_wait: bool,
    },

    /// Delete a session and wait for it to terminate
    Delete {
        /// Session ID
        id: String,

        /// Return once the delete is accepted
        #[arg(long)]
        no_wait: bool,
    },

    /// Open a running session in the browser
    Connect {
        /// Session ID or name
        session: String,

        /// Print the URL without opening it
        #[arg(long)]
        no_open: bool,
    },

    /// Wait for a session to reach a state
    Wait {
        /// Session ID
        id: String,

        /// State to wait for
        #[arg(long, value_enum)]
        until: WaitTarget,
    },
}

#[derive(Serialize)]
struct SessionResult<'a> {
    #[serde(flatten)]
    identity: &'a SessionIdentity,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a Session>,
}

#[derive(Serialize)]
struct ConnectResult<'a> {
    id: &'a str,
    name: &'a str,
    url: &'a str,
}

pub async fn run(command: SessionCommands, ctx: &mut CommandContext) -> Result<()> {
    match command {
        SessionCommands::List => list(ctx).await,
        SessionCommands::Launch {
            name,
            session_type,
            image,
            cores,
            ram,
            no_wait,
        } => launch(ctx, &name, session_type, image, cores, ram, no_wait).await,
        SessionCommands::Delete { id, no_wait } => delete(ctx, &id, no_wait).await,
        SessionCommands::Connect { session, no_open } => connect(ctx, &session, no_open).await,
        SessionCommands::Wait { id, until } => wait(ctx, &id, until).await,
    }
}

async fn list(ctx: &mut CommandContext) -> Result<()> {
    let portal = ctx.portal()?;
    let sessions = portal.check_for_sessions().await?;

    if ctx.format == OutputFormat::Text && !ctx.quiet {
        if let Some(banner) = ctx.banner() {
            println!("{}\n", banner);
        }
    }
    print_formatted(&sessions, ctx.format, |s| format_sessions(s));
    Ok(())
}

async fn launch(
    ctx: &mut CommandContext,
    name: &str,
    session_type: Option<String>,
    image: Option<String>,
    cores: Option<u32>,
    ram: Option<u32>,
    no_wait: bool,
) -> Result<()> {
    let portal = ctx.portal()?;
    let session_type = resolve_type(session_type, ctx.default_session_type())?;

    let options = portal.load_launch_options(&session_type).await?;
    let request = options.fill(name, image.as_deref(), cores, ram)?;
    tracing::debug!("Launch request: {:?}", request);

    let identity = request.identity();
    let watch = portal.request_session(request).await?;

    if no_wait {
        drop(watch);
        print_success(
            &format!("Requested {} session {}", session_types::label(&session_type), name),
            ctx.quiet,
        );
        return Ok(());
    }

    if let Some(outcome) = ctx.follow(watch).await? {
        let sessions = settle(outcome, &identity, WaitTarget::Running)?;
        report(ctx.format, &identity, WaitTarget::Running, &sessions);
    }
    Ok(())
}

async fn delete(ctx: &mut CommandContext, id: &str, no_wait: bool) -> Result<()> {
    let portal = ctx.portal()?;
    let watch = portal.delete_session(id).await?;

    if no_wait {
        drop(watch);
        print_success(&format!("Delete requested for session {}", id), ctx.quiet);
        return Ok(());
    }

    if let Some(outcome) = ctx.follow(watch).await? {
        let identity = SessionIdentity::id(id);
        let sessions = settle(outcome, &identity, WaitTarget::Terminated)?;
        report(ctx.format, &identity, WaitTarget::Terminated, &sessions);
    }
    Ok(())
}

async fn connect(ctx: &mut CommandContext, key: &str, no_open: bool) -> Result<()> {
    let portal = ctx.portal()?;
    let (session, url) = portal.connect(key).await?;

    let result = ConnectResult {
        id: &session.id,
        name: &session.name,
        url: &url,
    };
    print_formatted(&result, ctx.format, |r| r.url.to_string());

    if !no_open {
        if let Err(e) = open::that(&url) {
            tracing::warn!("Failed to open browser: {}", e);
            anyhow::bail!("Could not open a browser for {}", url);
        }
    }
    Ok(())
}

async fn wait(ctx: &mut CommandContext, id: &str, until: WaitTarget) -> Result<()> {
    let portal = ctx.portal()?;
    let identity = SessionIdentity::id(id);
    let watch = portal.watch_session(identity.clone(), until);

    if let Some(outcome) = ctx.follow(watch).await? {
        let sessions = settle(outcome, &identity, until)?;
        report(ctx.format, &identity, until, &sessions);
    }
    Ok(())
}

/// Pick the launch type, checking it against the known session types
fn resolve_type(session_type: Option<String>, default: &str) -> Result<String> {
    let map = SessionTypeMap::load();
    let session_type = session_type
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| default.to_string());

    if !map.contains(&session_type) {
        anyhow::bail!(
            "Unknown session type '{}' (choose from {})",
            session_type,
            map.session_types.join(", ")
        );
    }
    Ok(session_type)
}

/// Turn a finished watch into the session list, or an error naming what was awaited
fn settle(
    outcome: PollOutcome<Vec<Session>, ClientError>,
    identity: &SessionIdentity,
    target: WaitTarget,
) -> Result<Vec<Session>> {
    outcome
        .into_result()
        .with_context(|| format!("Waiting for {} to be {}", identity, target.description()))
}

fn report(format: OutputFormat, identity: &SessionIdentity, target: WaitTarget, sessions: &[Session]) {
    let session = identity.find(sessions);
    let result = SessionResult {
        identity,
        state: target.description(),
        session,
    };

    print_formatted(&result, format, |r| match r.session {
        Some(s) => {
            let mut text = format!("Session {} ({}) is {}", s.name, s.id, r.state);
            if let Some(image) = &s.image {
                text.push_str(&format!("\n  image:   {}", image));
            }
            if let Some(url) = &s.connect_url {
                text.push_str(&format!("\n  connect: {}", url));
            }
            text
        }
        None => format!("Session {} is {}", r.identity, r.state),
    });
}
