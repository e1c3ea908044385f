mod cli;

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use polytone_core::{Channel, SessionEvent, ToneSession};
use polytone_io::{LoadOptions, load_image, save_curve_plot, save_image};

use crate::cli::Cli;

const CURVE_PLOT_SIZE: u32 = 512;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let t0 = Instant::now();
    let settings = cli.settings()?;

    let input = cli.input.clone();
    let options = LoadOptions::from(&settings);
    let image = tokio::task::spawn_blocking(move || load_image(&input, &options))
        .await
        .context("image loader panicked")??;

    let mut session =
        ToneSession::new(image, &settings.session).context("failed to start tone session")?;
    let mut events = session.subscribe();
    let renderer = session.renderer();
    let point_count = session.config().point_count;

    let pending: Vec<_> = Channel::ALL
        .into_iter()
        .filter_map(|channel| {
            let spec = settings.curve(channel)?;
            Some((channel, renderer.submit(channel, spec.to_points(point_count))))
        })
        .collect();

    for (channel, handle) in pending {
        let render = handle
            .await
            .context("render task failed")?
            .with_context(|| format!("failed to fit {channel} curve"))?;
        match render {
            Some(render) => {
                session.commit(render)?;
            }
            None => warn!(%channel, "render superseded"),
        }
    }

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::CurveUpdated {
            channel,
            polynomial,
        } = event
        {
            debug!(%channel, coefficients = ?polynomial.coefficients(), "curve updated");
        }
    }

    if cli.print_coefficients {
        for channel in Channel::ALL {
            let coefficients = session.polynomial(channel).coefficients();
            println!("{channel}: {}", serde_json::to_string(coefficients)?);
        }
    }

    if let Some(path) = &cli.curve_plot {
        let curves: Vec<_> = Channel::ALL
            .into_iter()
            .map(|c| (c, session.curve_preview(c)))
            .collect();
        save_curve_plot(&curves, CURVE_PLOT_SIZE, path)?;
    }

    save_image(session.display(), &cli.output, settings.transfer)?;
    info!(
        output = %cli.output.display(),
        elapsed_ms = t0.elapsed().as_millis(),
        "done"
    );
    Ok(())
}
