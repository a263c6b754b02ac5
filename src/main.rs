use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use mio::Waker;
use tokio::signal;
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use zcrab::net::NetError;
use zcrab::{Config, Driver, Gateway};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "🦀 zcrab";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    setup().await;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init().await;

    init_tracing();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter = EnvFilter::try_new(config.log_level.as_str()).unwrap();
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> io::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = oneshot::channel();
    let (done_tx, mut done_rx) = oneshot::channel();

    let flag = shutdown.clone();
    thread::Builder::new()
        .name("zcrab-events".into())
        .spawn(move || {
            let result = event_loop(&flag, ready_tx);
            let _ = done_tx.send(result);
        })?;

    let (waker, addr) = match ready_rx.await {
        Ok(Ok(ready)) => ready,
        Ok(Err(e)) => return Err(io::Error::other(e)),
        Err(_) => return Err(io::Error::other("event loop exited during startup")),
    };
    info!("{} listening on {}", APP_NAME, addr);

    let mut hangup = unix_signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("{} shutting down", APP_NAME);
                shutdown.store(true, Ordering::Relaxed);
                if let Err(e) = waker.wake() {
                    warn!("cannot wake event loop: {e}");
                }
                break;
            }

            _ = hangup.recv() => {
                info!("reloading configuration");
                Config::reload().await;
                if let Err(e) = waker.wake() {
                    warn!("cannot wake event loop: {e}");
                }
            }

            result = &mut done_rx => {
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!("event loop failed: {e}");
                        Err(io::Error::other(e))
                    }
                    Err(_) => Err(io::Error::other("event loop vanished")),
                };
            }
        }
    }

    match done_rx.await {
        Ok(result) => result.map_err(io::Error::other),
        Err(_) => Ok(()),
    }
}

type Ready = Result<(Arc<Waker>, SocketAddr), NetError>;

/// Owns the driver for its whole life. Configuration changes reach it
/// through the generation counter, checked once per round.
fn event_loop(shutdown: &AtomicBool, ready: oneshot::Sender<Ready>) -> Result<(), NetError> {
    let config = Config::snapshot();

    let setup = Driver::new(Gateway::new()).and_then(|mut driver| {
        let (listener, addr) = driver.listen(config.listen_addr)?;
        let gateway = config.gateway.clone();
        driver.with_handler(|gw, links| gw.attach_root(links, listener, gateway));
        Ok((driver, addr))
    });

    let mut driver = match setup {
        Ok((driver, addr)) => {
            let _ = ready.send(Ok((driver.waker(), addr)));
            driver
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return Ok(());
        }
    };

    let mut seen = config.generation;
    driver.run(shutdown, |gw, links| {
        let generation = Config::generation();
        if generation != seen {
            seen = generation;
            gw.reconfigure(links, Config::snapshot().gateway);
        }
    })
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
