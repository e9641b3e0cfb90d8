use base_note_ui::app::*;
use base_note_ui::config::AppConfig;
use base_note_ui::logging;
use leptos::prelude::*;

fn main() {
    console_error_panic_hook::set_once();

    let config = AppConfig::load().unwrap_or_else(|err| {
        web_sys::console::warn_1(&format!("{err}; using default configuration").into());
        AppConfig::default()
    });
    logging::init(&config);
    tracing::info!(
        expected_chain_id = config.expected_chain_id,
        "starting Base Note"
    );

    mount_to_body(move || {
        view! { <App config=config /> }
    })
}
