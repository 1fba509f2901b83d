//! Launch resource commands

use anyhow::Result;
use clap::Subcommand;

use crate::cli::context::CommandContext;
use crate::cli::output::print_formatted;
use crate::client::SessionService;
use crate::session::{Context, Image};
use crate::session_types::{self, SessionTypeMap};

#[derive(Subcommand, Debug)]
pub enum ResourcesCommands {
    /// Show available cores and memory
    Context,

    /// List container images
    Images {
        /// Only images for this session type
        #[arg(long = "type")]
        session_type: Option<String>,
    },

    /// List launchable session types
    Types,
}

pub async fn run(command: ResourcesCommands, ctx: &mut CommandContext) -> Result<()> {
    match command {
        ResourcesCommands::Context => context(ctx).await,
        ResourcesCommands::Images { session_type } => images(ctx, session_type.as_deref()).await,
        ResourcesCommands::Types => {
            types(ctx);
            Ok(())
        }
    }
}

async fn context(ctx: &mut CommandContext) -> Result<()> {
    let portal = ctx.portal()?;
    let context = portal.service().context().await?;
    print_formatted(&context, ctx.format, format_context);
    Ok(())
}

async fn images(ctx: &mut CommandContext, session_type: Option<&str>) -> Result<()> {
    let portal = ctx.portal()?;
    let images = portal.service().list_images(session_type).await?;
    print_formatted(&images, ctx.format, |i| format_images(i));
    Ok(())
}

fn types(ctx: &CommandContext) {
    let map = SessionTypeMap::load();
    print_formatted(&map, ctx.format, format_types);
}

fn format_choices(choices: &[u32], default: Option<u32>) -> String {
    if choices.is_empty() {
        return "-".to_string();
    }
    choices
        .iter()
        .map(|c| {
            if Some(*c) == default {
                format!("{}*", c)
            } else {
                c.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_context(context: &Context) -> String {
    format!(
        "Cores:       {}\nMemory (GB): {}\n(* = default)",
        format_choices(&context.available_cores, context.default_cores),
        format_choices(&context.available_ram, context.default_ram)
    )
}

fn format_images(images: &[Image]) -> String {
    if images.is_empty() {
        return "No container images found".to_string();
    }
    images
        .iter()
        .map(|i| {
            let mut line = i.id.clone();
            if !i.types.is_empty() {
                line.push_str(&format!("  [{}]", i.types.join(", ")));
            }
            if let Some(digest) = &i.digest {
                line.push_str(&format!("  {}", short_digest(digest)));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// First 12 hex digits of an image digest
fn short_digest(digest: &str) -> &str {
    let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
    hex.get(..12).unwrap_or(hex)
}

fn format_types(map: &SessionTypeMap) -> String {
    map.session_types
        .iter()
        .map(|t| {
            let marker = if *t == map.default { " (default)" } else { "" };
            format!("{:<10} {}{}", t, session_types::label(t), marker)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
