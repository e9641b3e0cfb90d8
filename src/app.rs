use leptos::prelude::*;
use leptos::task::spawn_local;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

use crate::addresses::AddressRegistry;
use crate::chains::chain_name;
use crate::config::{AppConfig, MAX_NOTE_BYTES};
use crate::contract::ContractFactory;
use crate::explorer::{address_url, explorer_base_url, tx_url};
use crate::injected::InjectedProvider;
use crate::network::{NetworkReconciler, NetworkState};
use crate::note::{byte_length, NoteReconciler, NoteState, SubmitStatus};
use crate::runtime::BrowserRuntime;
use crate::session::{SessionManager, WalletSession};
use crate::storage::PageStorage;
use crate::wallet::WalletAdapter;

const CARD_STYLE: &str = "border: 1px solid #e5e7eb; border-radius: 8px; padding: 1rem; display: flex; flex-direction: column; gap: 0.5rem;";
const BUTTON_STYLE: &str = "padding: 0.4rem 1rem; border: 1px solid #d1d5db; border-radius: 6px; background: transparent; cursor: pointer;";
const ERROR_STYLE: &str = "color: #dc2626; font-size: 0.9rem; word-break: break-word;";
const MUTED_STYLE: &str = "color: #52525b; font-size: 0.8rem;";

/// The reconcilers behind the page. Lives on the main thread only.
struct Services {
    wallet_available: bool,
    expected_chain_id: u64,
    registry: AddressRegistry,
    session: SessionManager<InjectedProvider, PageStorage>,
    network: NetworkReconciler<InjectedProvider>,
    notes: NoteReconciler<InjectedProvider, BrowserRuntime>,
}

#[derive(Clone, Copy)]
struct AppContext {
    services: StoredValue<Services, LocalStorage>,
    session: RwSignal<WalletSession>,
    network: RwSignal<NetworkState>,
    note: RwSignal<NoteState>,
}

#[component]
pub fn App(config: AppConfig) -> impl IntoView {
    let provider = InjectedProvider::detect();
    if provider.is_none() {
        tracing::warn!("no injected wallet found");
    }
    let wallet = WalletAdapter::new(provider);
    let runtime = BrowserRuntime;
    let registry = AddressRegistry::from_config(&config);

    let session = SessionManager::new(wallet.clone(), PageStorage::open());
    let network = NetworkReconciler::new(wallet.clone(), config.expected_chain_id);
    let notes = NoteReconciler::new(
        ContractFactory::new(wallet.clone(), registry.clone()),
        runtime,
        session.state(),
        network.state(),
        &config,
    );

    let disposers = vec![
        session.start(&runtime),
        network.start(&runtime),
        notes.start(),
    ];
    let ctx = AppContext {
        session: RwSignal::from(session.state()),
        network: RwSignal::from(network.state()),
        note: RwSignal::from(notes.state()),
        services: StoredValue::new_local(Services {
            wallet_available: wallet.is_available(),
            expected_chain_id: config.expected_chain_id,
            registry,
            session,
            network,
            notes,
        }),
    };
    provide_context(ctx);

    Effect::new(move |_| {
        let chain_id = ctx.network.with(|n| n.chain_id);
        ctx.services.with_value(|s| s.notes.follow_chain(chain_id));
    });

    let disposers = StoredValue::new_local(disposers);
    on_cleanup(move || {
        disposers.update_value(|disposers| {
            for disposer in disposers.drain(..) {
                disposer.dispose();
            }
        });
    });

    view! {
        <main style="max-width: 720px; margin: 0 auto; padding: 1.5rem; display: flex; flex-direction: column; gap: 1rem; font-family: system-ui, sans-serif;">
            <ConnectWallet />
            <NetworkBadge />
            <h1 style="font-size: 1.25rem; font-weight: 600; margin: 0;">"Base Note"</h1>
            <ContractLinks />
            <NoteViewer />
            <NoteEditor />
        </main>
    }
}

#[component]
fn ConnectWallet() -> impl IntoView {
    let ctx = expect_context::<AppContext>();
    let available = ctx.services.with_value(|s| s.wallet_available);
    let (connecting, set_connecting) = signal(false);
    let (error, set_error) = signal(None::<String>);

    let connect = move |_| {
        let (session, network) = ctx
            .services
            .with_value(|s| (s.session.clone(), s.network.clone()));
        set_error.set(None);
        set_connecting.set(true);
        spawn_local(async move {
            match session.connect().await {
                // Providers without chainChanged events only refresh on demand.
                Ok(_) => network.refresh().await,
                Err(err) => set_error.set(Some(err.to_string())),
            }
            set_connecting.set(false);
        });
    };

    let disconnect = move |_| {
        ctx.services.with_value(|s| s.session.disconnect());
    };

    let body = move || {
        let session = ctx.session.get();
        if !available {
            view! {
                <span style=MUTED_STYLE>"No injected wallet found. Install a browser wallet to continue."</span>
            }
            .into_any()
        } else if let Some(address) = session.address.clone() {
            view! {
                <span style="font-family: monospace;" title=address>{session.short_address()}</span>
                <button style=BUTTON_STYLE on:click=disconnect>"Disconnect"</button>
            }
            .into_any()
        } else {
            view! {
                <button style=BUTTON_STYLE on:click=connect disabled=move || connecting.get()>
                    {move || if connecting.get() { "Connecting..." } else { "Connect Wallet" }}
                </button>
            }
            .into_any()
        }
    };

    view! {
        <div style="display: flex; align-items: center; gap: 0.75rem;">
            {body}
            {move || error.get().map(|e| view! { <span style=ERROR_STYLE>{e}</span> })}
        </div>
    }
}

#[component]
fn NetworkBadge() -> impl IntoView {
    let ctx = expect_context::<AppContext>();
    let available = ctx.services.with_value(|s| s.wallet_available);

    let switch = move |_| {
        let network = ctx.services.with_value(|s| s.network.clone());
        spawn_local(async move { network.switch_to_expected().await });
    };

    let body = move || {
        let state = ctx.network.get();
        if !available {
            return view! { <div style=MUTED_STYLE>"Network: wallet not detected"</div> }.into_any();
        }
        let Some(chain_id) = state.chain_id else {
            return view! {
                <div style=MUTED_STYLE>"Network: unknown"</div>
                {state.error.map(|e| view! { <div style=ERROR_STYLE>{e}</div> })}
            }
            .into_any();
        };

        let expected = state.expected_chain_id;
        let wrong = state.is_wrong_network();
        let switching = state.switching;
        view! {
            <div
                style={if wrong { "color: #b45309;" } else { "" }}
                title={format!("Expected chainId: {expected}")}
            >
                "Network: "
                <span style="font-weight: 500;">{chain_name(chain_id)}</span>
                " "
                <span style=MUTED_STYLE>{format!("(chainId: {chain_id})")}</span>
            </div>
            {wrong.then(|| view! {
                <div style="display: flex; align-items: center; gap: 0.5rem; color: #b45309; font-size: 0.8rem;">
                    <span>{format!("Wrong network. Please switch to {} (chainId {expected}).", chain_name(expected))}</span>
                    <button
                        style=BUTTON_STYLE
                        on:click=switch
                        disabled=switching
                        title="Switch network in your wallet"
                    >
                        {if switching { "Switching..." } else { "Switch Network" }}
                    </button>
                </div>
            })}
            {state.error.map(|e| view! { <div style=ERROR_STYLE>{e}</div> })}
        }
        .into_any()
    };

    view! { <section style=CARD_STYLE>{body}</section> }
}

#[component]
fn ContractLinks() -> impl IntoView {
    let ctx = expect_context::<AppContext>();

    let copy = move |address: String| spawn_local(copy_to_clipboard(address));

    let body = move || {
        let Some(chain_id) = ctx.network.get().chain_id else {
            return view! { <div style=MUTED_STYLE>"Waiting for the wallet network..."</div> }
                .into_any();
        };
        match ctx.services.with_value(|s| s.registry.resolve(chain_id)) {
            Err(err) => view! { <div style=ERROR_STYLE>{err.to_string()}</div> }.into_any(),
            Ok(address) => {
                let address = address.to_string();
                let link = (!explorer_base_url(chain_id).is_empty())
                    .then(|| address_url(chain_id, &address));
                let copied = address.clone();
                view! {
                    <div style="display: flex; align-items: center; justify-content: space-between; gap: 0.75rem;">
                        <span style="font-family: monospace; word-break: break-all;">{address}</span>
                        <div style="display: flex; flex-direction: column; gap: 0.5rem; flex-shrink: 0;">
                            <button style=BUTTON_STYLE type="button" on:click=move |_| copy(copied.clone())>
                                "Copy Address"
                            </button>
                            {link.map(|href| view! {
                                <a style=BUTTON_STYLE href=href target="_blank" rel="noreferrer">"Open in BaseScan"</a>
                            })}
                        </div>
                    </div>
                }
                .into_any()
            }
        }
    };

    view! {
        <section style=CARD_STYLE>
            <div style="font-weight: 500;">"BaseNote Contract"</div>
            {body}
        </section>
    }
}

/// Copies `text` with the async clipboard API, or shows it in a prompt when
/// the page may not write to the clipboard.
async fn copy_to_clipboard(text: String) {
    let window = window();
    let navigator = window.navigator();
    let has_clipboard = js_sys::Reflect::get(&navigator, &JsValue::from_str("clipboard"))
        .is_ok_and(|clipboard| !clipboard.is_undefined());
    let copied = if has_clipboard {
        JsFuture::from(navigator.clipboard().write_text(&text)).await
    } else {
        Err(JsValue::UNDEFINED)
    };
    match copied {
        Ok(_) => {
            if window.alert_with_message("Copied!").is_err() {
                tracing::debug!("alert unavailable");
            }
        }
        Err(err) => {
            tracing::debug!(?err, "clipboard write failed");
            if window
                .prompt_with_message_and_default("Copy this:", &text)
                .is_err()
            {
                tracing::debug!("copy prompt unavailable");
            }
        }
    }
}

/// Explorer link for `hash` on the wallet's chain, falling back to the expected one.
fn tx_link(chain_id: u64, hash: String) -> impl IntoView {
    if explorer_base_url(chain_id).is_empty() {
        return view! { <span>{hash}</span> }.into_any();
    }
    let href = tx_url(chain_id, &hash);
    view! {
        <a href=href target="_blank" rel="noreferrer" style="text-decoration: underline;">
            {hash}
        </a>
    }
    .into_any()
}

#[component]
fn NoteViewer() -> impl IntoView {
    let ctx = expect_context::<AppContext>();
    let expected = ctx.services.with_value(|s| s.expected_chain_id);

    let body = move || {
        let note = ctx.note.get();
        let chain_id = ctx.network.with(|n| n.chain_id).unwrap_or(expected);
        if let Some(err) = note.error {
            return view! { <p style=ERROR_STYLE>{err}</p> }.into_any();
        }

        let text = if note.text.is_empty() {
            "(empty)".to_string()
        } else {
            note.text
        };
        let pending = note
            .pending_tx_hash
            .filter(|_| !note.confirmed)
            .map(|hash| view! {
                <div style="color: #b45309; font-size: 0.8rem; word-break: break-all;">
                    "Pending confirmation: " {tx_link(chain_id, hash.to_string())}
                </div>
            });
        let last_update = note
            .last_confirmed_block
            .zip(note.last_confirmed_tx_hash)
            .map(|(block, hash)| view! {
                <div style=MUTED_STYLE>
                    <div>{format!("Last update block: {block}")}</div>
                    <div style="word-break: break-all;">"Tx: " {tx_link(chain_id, hash.to_string())}</div>
                </div>
            });

        view! {
            <div style=MUTED_STYLE>
                "hasNote: " <span style="font-family: monospace;">{note.has_note.to_string()}</span>
                " • length: " <span style="font-family: monospace;">{note.byte_length}</span>
            </div>
            <div style="white-space: pre-wrap; border-radius: 6px; background: #fafafa; padding: 0.75rem;">
                {text}
            </div>
            {pending}
            {last_update}
        }
        .into_any()
    };

    view! {
        <section style=CARD_STYLE>
            <h2 style="font-size: 0.9rem; font-weight: 500; margin: 0;">"On-chain note (live)"</h2>
            {body}
        </section>
    }
}

#[component]
fn NoteEditor() -> impl IntoView {
    let ctx = expect_context::<AppContext>();
    let draft = RwSignal::new(String::new());

    let used = Memo::new(move |_| draft.with(|text| byte_length(text)));
    let over_limit = move || used.get() > MAX_NOTE_BYTES;
    let status = move || ctx.note.with(|n| n.status);
    let connected = move || ctx.session.with(WalletSession::connected);
    let writable = move || ctx.network.with(NetworkState::writes_enabled);
    let disabled = move || status().in_flight() || over_limit() || !connected() || !writable();

    let save = move |_| {
        let text = draft.get_untracked();
        let notes = ctx.services.with_value(|s| s.notes.clone());
        spawn_local(async move {
            let reload = notes.clone();
            let saved = notes
                .submit(&text, move || spawn_local(async move { reload.load().await }))
                .await;
            if let Err(err) = saved {
                tracing::debug!(%err, "save did not complete");
            }
        });
    };

    let hint = move || {
        if !connected() {
            "Connect wallet first".to_string()
        } else if over_limit() {
            "Note too long".to_string()
        } else if !writable() {
            let expected = ctx.network.with(|n| n.expected_chain_id);
            format!("Switch to {} first", chain_name(expected))
        } else {
            String::new()
        }
    };

    let label = move || match status() {
        SubmitStatus::Idle => "Save on-chain",
        SubmitStatus::Signing => "Confirm in wallet...",
        SubmitStatus::Mining => "Mining...",
        SubmitStatus::Done => "Saved ✅",
    };

    let tx_hash = move || {
        ctx.note.with(|n| match n.status {
            SubmitStatus::Mining => n.pending_tx_hash,
            SubmitStatus::Done => n.last_confirmed_tx_hash,
            _ => None,
        })
    };

    let counter_style = move || {
        if over_limit() {
            "color: #dc2626; font-size: 0.8rem;"
        } else {
            MUTED_STYLE
        }
    };

    view! {
        <section style=CARD_STYLE>
            <h2 style="font-size: 0.9rem; font-weight: 500; margin: 0;">"Write note"</h2>
            <textarea
                rows="4"
                style=move || format!(
                    "width: 100%; box-sizing: border-box; border-radius: 6px; padding: 0.5rem; border: 1px solid {};",
                    if over_limit() { "#ef4444" } else { "#d1d5db" },
                )
                placeholder="Type your note..."
                prop:value=move || draft.get()
                on:input=move |ev| draft.set(event_target_value(&ev))
            ></textarea>
            <div style="display: flex; justify-content: space-between;">
                <span style=counter_style>{move || format!("{} / {MAX_NOTE_BYTES} bytes", used.get())}</span>
                <span style=counter_style>
                    {move || format!("{} remaining", MAX_NOTE_BYTES as i64 - used.get() as i64)}
                </span>
            </div>
            <div style="display: flex; align-items: center; gap: 0.75rem;">
                <button style=BUTTON_STYLE on:click=save disabled=disabled title=hint>
                    {label}
                </button>
                {move || (!connected()).then(|| view! {
                    <span style=MUTED_STYLE>"Connect wallet to enable writing"</span>
                })}
                {move || tx_hash().map(|hash| view! {
                    <span style="color: #52525b; font-size: 0.8rem; word-break: break-all;">{format!("tx: {hash}")}</span>
                })}
            </div>
            {move || ctx.note.with(|n| n.submit_error.clone()).map(|e| view! { <p style=ERROR_STYLE>{e}</p> })}
        </section>
    }
}
