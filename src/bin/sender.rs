//! Microphone sender application
//!
//! Captures the default input device and streams it to whichever receiver
//! completes the TCP handshake. Type a number on stdin to change the volume
//! multiplier while streaming; Ctrl-C stops the session.

use anyhow::Result;
use std::io::BufRead;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_mic_streamer::{
    audio::capture::CpalCapture,
    config::AppConfig,
    session::{SessionState, StreamSession},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN mic sender");

    let mut config = AppConfig::load()?;
    if let Some(port) = std::env::args().nth(1) {
        config.network.tcp_port = port.parse()?;
    }
    config.validate()?;

    let capture = CpalCapture::open(config.audio)?;
    let (mut session, events) = StreamSession::new(config.clone(), Box::new(capture));
    session.start()?;

    println!(
        "Listening for a receiver on TCP port {} (volume x{:.1})",
        config.network.tcp_port,
        session.volume()
    );
    println!("Type a new multiplier (0-20) and press enter to adjust volume.");

    // stdin is the controller's volume writer path
    let volume = session.volume_control();
    tokio::task::spawn_blocking(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match line.trim().parse::<f32>() {
                Ok(multiplier) => {
                    volume.set(multiplier);
                    println!("volume set to x{:.1}", volume.get());
                }
                Err(_) if line.trim().is_empty() => {}
                Err(_) => println!("not a number: {line}"),
            }
        }
    });

    'run: loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, stopping");
                break 'run;
            }
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                while let Ok(event) = events.try_recv() {
                    match event.state {
                        SessionState::Error => {
                            if let Some(cause) = event.failure {
                                tracing::error!(error = %cause, "session failed");
                            } else {
                                tracing::error!("session failed");
                            }
                            break 'run;
                        }
                        state => tracing::info!(%state, "session state"),
                    }
                }
            }
        }
    }

    session.stop();
    tracing::info!("Session stopped");
    Ok(())
}
