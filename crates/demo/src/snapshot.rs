//! Renders the demo apps into an in-memory page, plays a few clicks on each
//! and prints the HTML after every step.
//!
//! Usage: `demo-snapshot [APP] [--journal]`
//!
//! `ILLUMINATI_CONFIG` may hold a JSON [`Config`], e.g.
//! `{"ordering": "reorder"}`.
use demo::apps::{self, DEMOS};
use illuminati::{config::Config, mem::MemPage, Engine, Error};

fn config() -> Result<Config, Error> {
    match std::env::var("ILLUMINATI_CONFIG") {
        Ok(json) => Config::from_json(&json),
        Err(_) => Ok(Config::default()),
    }
}

fn run(name: &str, clicks: &[&str], config: Config, journal: bool) -> Result<(), Error> {
    let page = MemPage::with_target("app")?;
    let tree = apps::app(name, &page).ok_or_else(|| Error::Config {
        message: format!("no app called '{name}'").into(),
    })?;
    let engine = Engine::new(page.clone(), config);
    let mount = illuminati::attach(&engine, "#app", tree)?;
    log::info!("{name}: {} nodes", engine.node_count());

    let show = |step: &str| -> Result<(), Error> {
        engine.flush();
        let html = page.inner_html("#app")?;
        if html.len() > 200 {
            let head = html.chars().take(200).collect::<String>();
            println!("{name} {step}: {head}... ({} bytes)", html.len());
        } else {
            println!("{name} {step}: {html}");
        }
        Ok(())
    };

    show("init")?;
    for selector in clicks {
        page.click(selector)?;
        show(&format!("click {selector}"))?;
    }
    if journal {
        let json = serde_json::to_string_pretty(&page.journal()).map_err(|e| Error::Config {
            message: e.to_string().into(),
        })?;
        println!("{json}");
    }
    mount.unmount();
    Ok(())
}

fn main() {
    env_logger::builder().init();

    let mut journal = false;
    let mut only = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--journal" => journal = true,
            name => only = Some(name.to_string()),
        }
    }

    let config = match config() {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(1);
        }
    };
    log::debug!("{config:?}");

    for (name, clicks) in DEMOS {
        if only.as_deref().is_some_and(|only| only != *name) {
            continue;
        }
        if let Err(err) = run(name, clicks, config.clone(), journal) {
            log::error!("{name}: {err}");
            std::process::exit(1);
        }
    }
}
