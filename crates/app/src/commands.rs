use std::path::Path;
use std::sync::Arc;

use qanoon_api::{HttpBackend, ThreadSummary};
use qanoon_chat::{
    ChatPage, GateOutcome, Notice, NoticeLevel, PendingFile, RefreshOutcome, SettingsPanel,
};
use qanoon_session::{Session, SupabaseSessionProvider};
use snafu::{OptionExt, ResultExt};

use crate::config::{ClientSettings, SettingsStore};
use crate::error::{
    AppResult, BackendSnafu, ChatSnafu, IdentitySnafu, NotSignedInSnafu, SessionUnavailableSnafu,
    SettingsSnafu, ThreadNotFoundSnafu,
};
use crate::{Cli, Command};

/// Collaborators shared by every command.
struct Client {
    settings: Arc<ClientSettings>,
    session: Arc<SupabaseSessionProvider>,
    backend: Arc<HttpBackend>,
}

impl Client {
    fn connect(store: &SettingsStore) -> AppResult<Self> {
        let settings = store.settings();
        let backend = HttpBackend::new(settings.api_config()).context(BackendSnafu {
            stage: "connect-backend",
        })?;
        let session = SupabaseSessionProvider::new(
            settings.supabase_config(store.session_file_path()),
        )
        .context(IdentitySnafu {
            stage: "connect-identity-provider",
        })?;

        Ok(Self {
            settings,
            session: Arc::new(session),
            backend: Arc::new(backend),
        })
    }

    fn page(&self) -> ChatPage {
        ChatPage::new(self.session.clone(), self.backend.clone())
    }

    /// Activates a chat page and fails unless the session gate opens.
    async fn open_page(&self) -> AppResult<ChatPage> {
        let page = self.page();
        match page.activate().await {
            GateOutcome::Open { .. } => Ok(page),
            GateOutcome::SignedOut => NotSignedInSnafu {
                stage: "open-chat-page",
            }
            .fail(),
            GateOutcome::Failed { message } => SessionUnavailableSnafu {
                stage: "open-chat-page",
                message,
            }
            .fail(),
        }
    }
}

pub(crate) async fn run(cli: Cli) -> AppResult<()> {
    let store = match cli.config {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };

    if let Command::Config {
        api_base_url,
        auth_url,
        auth_anon_key,
        redirect_url,
        timeout_ms,
    } = cli.command
    {
        let mut settings = ClientSettings::clone(&store.settings());
        let mut changed = false;
        for (field, value) in [
            (&mut settings.api_base_url, api_base_url),
            (&mut settings.auth_url, auth_url),
            (&mut settings.auth_anon_key, auth_anon_key),
            (&mut settings.redirect_url, redirect_url),
        ] {
            if let Some(value) = value {
                *field = value;
                changed = true;
            }
        }
        if let Some(timeout_ms) = timeout_ms {
            settings.request_timeout_ms = Some(timeout_ms);
            changed = true;
        }
        if changed {
            store.update(settings).context(SettingsSnafu {
                stage: "config-update",
            })?;
        }
        print_settings(&store);
        return Ok(());
    }

    let client = Client::connect(&store)?;
    match cli.command {
        Command::Login { provider } => {
            let provider = provider.unwrap_or_else(|| client.settings.oauth_provider.clone());
            let redirect = client
                .page()
                .sign_in(&provider, &client.settings.redirect_url)
                .await
                .context(ChatSnafu { stage: "login" })?;
            println!("Open this URL to sign in with {}:", redirect.provider);
            println!("{}", redirect.url);
            println!("Then run `qanoon session --access-token <token>` with the token from the callback.");
        }
        Command::Session {
            access_token,
            refresh_token,
            expires_at,
            email,
        } => {
            let mut session = Session::new(access_token);
            if let Some(refresh_token) = refresh_token {
                session = session.with_refresh_token(refresh_token);
            }
            if let Some(expires_at) = expires_at {
                session = session.with_expires_at(expires_at);
            }
            if let Some(email) = email {
                session = session.with_user_email(email);
            }
            client.session.complete_sign_in(session).context(IdentitySnafu {
                stage: "store-session",
            })?;
            println!("Signed in.");
        }
        Command::Logout => {
            client
                .page()
                .sign_out()
                .await
                .context(ChatSnafu { stage: "logout" })?;
            println!("Signed out.");
        }
        Command::Threads => {
            let page = client.open_page().await?;
            let state = page.snapshot();
            if state.threads.is_empty() {
                println!("No chats yet");
            }
            for thread in &state.threads {
                println!("{}\t{}", thread.id, thread.display_title());
            }
        }
        Command::Show { thread_id } => {
            let page = client.open_page().await?;
            let thread = find_thread(&page, &thread_id)?;
            println!("# {}", thread.display_title());
            page.select_thread(thread).await;
            print_messages(&page);
        }
        Command::Latest => {
            let page = client.open_page().await?;
            match page.on_thread_created().await {
                RefreshOutcome::Selected(thread_id) => {
                    let title = page
                        .snapshot()
                        .conversation
                        .active_thread()
                        .map(|thread| thread.display_title().to_string())
                        .unwrap_or_default();
                    println!("{thread_id}\t{title}");
                }
                RefreshOutcome::EmptyDirectory => println!("No chats yet"),
                RefreshOutcome::Unchanged => eprintln!("Could not refresh the chat list."),
            }
        }
        Command::Attach { thread_id, file } => {
            attach(&client, &thread_id, &file).await?;
        }
        Command::Settings { prompt, reset } => {
            client.open_page().await?;
            let mut panel = SettingsPanel::new(client.session.clone(), client.backend.clone());
            let loaded = panel.load().await;
            print_status(panel.state().status.as_ref());
            loaded.context(ChatSnafu {
                stage: "settings-load",
            })?;

            let change = if let Some(prompt) = prompt {
                panel.set_custom_prompt(prompt);
                Some(panel.save().await.map(drop))
            } else if reset {
                Some(panel.reset().await.map(drop))
            } else {
                None
            };
            if let Some(result) = change {
                print_status(panel.state().status.as_ref());
                result.context(ChatSnafu {
                    stage: "settings-change",
                })?;
            }

            let state = panel.state();
            println!("Email: {}", state.email);
            if state.custom_prompt.is_empty() {
                println!("Custom prompt: (default)");
            } else {
                println!("Custom prompt:\n{}", state.custom_prompt);
            }
        }
        Command::Config { .. } => {}
    }
    Ok(())
}

async fn attach(client: &Client, thread_id: &str, file: &Path) -> AppResult<()> {
    let file = PendingFile::from_path(file).context(ChatSnafu {
        stage: "attach-read-file",
    })?;
    let page = client.open_page().await?;
    let thread = find_thread(&page, thread_id)?;
    page.begin_select(thread);

    let result = page.add_pdf_to_active_thread(file).await;
    print_status(page.dismiss_notice().as_ref());
    result.context(ChatSnafu {
        stage: "attach-upload",
    })?;
    Ok(())
}

fn find_thread(page: &ChatPage, thread_id: &str) -> AppResult<ThreadSummary> {
    page.snapshot()
        .threads
        .into_iter()
        .find(|thread| thread.id.as_str() == thread_id)
        .context(ThreadNotFoundSnafu {
            stage: "find-thread",
            thread_id,
        })
}

fn print_messages(page: &ChatPage) {
    let state = page.snapshot();
    let messages = state.conversation.messages();
    if messages.is_empty() {
        println!("No messages yet.");
    }
    for message in messages {
        println!(
            "[{}] {}",
            message.role.as_deref().unwrap_or("unknown"),
            message.text()
        );
    }
}

fn print_status(notice: Option<&Notice>) {
    match notice {
        Some(Notice {
            level: NoticeLevel::Info,
            text,
        }) => println!("{text}"),
        Some(Notice {
            level: NoticeLevel::Warning,
            text,
        }) => eprintln!("warning: {text}"),
        Some(Notice {
            level: NoticeLevel::Error,
            text,
        }) => eprintln!("{text}"),
        None => {}
    }
}

fn print_settings(store: &SettingsStore) {
    let settings = store.settings();
    println!("settings file:  {}", store.config_path().display());
    println!("api_base_url:   {}", settings.api_base_url);
    println!("auth_url:       {}", settings.auth_url);
    println!(
        "auth_anon_key:  {}",
        if settings.auth_anon_key.is_empty() { "(unset)" } else { "(set)" }
    );
    println!("oauth_provider: {}", settings.oauth_provider);
    println!("redirect_url:   {}", settings.redirect_url);
    match settings.request_timeout_ms {
        Some(timeout) => println!("timeout_ms:     {timeout}"),
        None => println!("timeout_ms:     (none)"),
    }
}
