use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::debug;

use cloudvault_core::api::{Download, ProgressFn};
use cloudvault_core::models::{RegisterRequest, StoredFile, User};
use cloudvault_core::state::{AdminState, AuthState, FilesState, LoadStatus};
use cloudvault_core::utils::{format_date, format_size, truncate_string};
use cloudvault_core::{ApiClient, Config};

use crate::{Cli, Command};

/// Width of the name column in file listings
const NAME_COLUMN_WIDTH: usize = 40;

pub async fn run(cli: &Cli, config: &mut Config) -> Result<()> {
    let api = config.connect()?;
    debug!(api_url = %config.api_url, "Client ready");

    match &cli.command {
        Command::Login { username } => login(&api, config, username.clone()).await,
        Command::Register => register(&api, config).await,
        Command::Logout => {
            api.logout().await?;
            println!("Logged out.");
            Ok(())
        }
        Command::Whoami => {
            let user = api.current_user().await?;
            if cli.json {
                return print_json(&user);
            }
            print_user(&user);
            Ok(())
        }
        Command::Ls { user, filter } => list_files(&api, cli.json, *user, filter.as_deref()).await,
        Command::Upload { path, comment } => upload(&api, path, comment).await,
        Command::Download { id, output } => {
            let download = api.download_file(*id, Some(download_progress())).await?;
            eprintln!();
            let fallback = format!("file-{}", id);
            let path = save_download(download, output.as_deref(), &fallback)?;
            println!("Saved {}", path.display());
            Ok(())
        }
        Command::Rm { id, admin } => {
            if *admin {
                api.admin_delete_file(*id).await?;
            } else {
                api.delete_file(*id).await?;
            }
            println!("Deleted file {}.", id);
            Ok(())
        }
        Command::Comment { id, text } => {
            let file = api.update_comment(*id, text).await?;
            println!("{}: {}", file.original_name, file.comment);
            Ok(())
        }
        Command::Share { id } => {
            let file = api.get_file(*id).await?;
            println!("{}", file.share_page_url(config.share_origin()));
            match file.last_download {
                Some(at) => println!("Last downloaded: {}", format_date(&at)),
                None => println!("Not downloaded yet"),
            }
            Ok(())
        }
        Command::ShareInfo { link } => {
            let info = api.share_info(link).await?;
            if cli.json {
                return print_json(&info);
            }
            println!("{} ({})", info.original_name, info.size_display());
            println!("Uploaded: {}", format_date(&info.upload_date));
            if !info.comment.is_empty() {
                println!("Comment:  {}", info.comment);
            }
            Ok(())
        }
        Command::FetchShared { link, output } => {
            let download = api.download_shared(link).await?;
            let path = save_download(download, output.as_deref(), link)?;
            println!("Saved {}", path.display());
            Ok(())
        }
        Command::Users { filter } => list_users(&api, cli.json, filter.as_deref()).await,
        Command::SetAdmin { id, admin } => {
            let user = api.set_admin(*id, *admin).await?;
            println!(
                "{} is {} an administrator.",
                user.username,
                if user.has_admin_access() { "now" } else { "no longer" }
            );
            Ok(())
        }
        Command::RmUser { id } => {
            api.delete_user(*id).await?;
            println!("Deleted user {}.", id);
            Ok(())
        }
    }
}

async fn login(api: &ApiClient, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let mut state = AuthState::default();
    state.logging_in();
    match api.login(&username, &password).await {
        Ok(user) => state.logged_in(user),
        Err(e) => {
            state.failed(&e);
            return Err(e);
        }
    }

    config.remember_username(&username)?;
    if let Some(ref user) = state.user {
        println!(
            "Logged in as {}{}.",
            user.display_name(),
            if state.is_admin { " (admin)" } else { "" }
        );
    }
    Ok(())
}

async fn register(api: &ApiClient, config: &mut Config) -> Result<()> {
    let request = RegisterRequest {
        username: prompt("Username: ")?,
        email: prompt("Email: ")?,
        first_name: prompt("First name: ")?,
        last_name: prompt("Last name: ")?,
        password: rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };
    let user = api.register(&request).await?;
    config.remember_username(&user.username)?;
    println!("Welcome, {}!", user.display_name());
    Ok(())
}

async fn list_files(api: &ApiClient, json: bool, user: Option<i64>, filter: Option<&str>) -> Result<()> {
    let mut state = FilesState::new();
    state.begin(LoadStatus::Loading);
    let result = match user {
        Some(id) => api.user_files(id).await,
        None => api.list_files(None).await,
    };
    match result {
        Ok(files) => state.loaded(files),
        Err(e) => {
            state.failed(&e);
            return Err(e);
        }
    }

    let files = state.filtered(filter.unwrap_or(""));
    if json {
        return print_json(&files);
    }
    if files.is_empty() {
        println!("No files.");
        return Ok(());
    }
    for file in &files {
        print_file(file);
    }
    println!(
        "{} file(s), {} total",
        files.len(),
        format_size(files.iter().map(|f| f.size).sum())
    );
    Ok(())
}

async fn upload(api: &ApiClient, path: &Path, comment: &str) -> Result<()> {
    let state = Arc::new(Mutex::new(FilesState::new()));
    if let Ok(mut s) = state.lock() {
        s.begin(LoadStatus::Uploading);
    }

    let tracker = Arc::clone(&state);
    let progress: ProgressFn = Arc::new(move |sent, total| {
        if let Ok(mut s) = tracker.lock() {
            s.set_upload_progress(sent, total.unwrap_or(sent));
            eprint!("\rUploading... {:>3}%", s.upload_progress);
        }
    });

    let file = api.upload_path(path, comment, Some(progress)).await?;
    eprintln!();
    println!("Uploaded {} (id {}, {})", file.original_name, file.id, file.size_display());
    if let Ok(mut s) = state.lock() {
        s.uploaded(file);
    }
    Ok(())
}

async fn list_users(api: &ApiClient, json: bool, filter: Option<&str>) -> Result<()> {
    let mut state = AdminState::new();
    state.begin();
    match api.list_users().await {
        Ok(users) => state.loaded(users),
        Err(e) => {
            state.failed(&e);
            return Err(e);
        }
    }

    let users = state.filtered(filter.unwrap_or(""));
    if json {
        return print_json(&users);
    }
    for user in users {
        println!(
            "{:>5}  {:<20} {:<30} {:>4} files {:>10}{}",
            user.id,
            user.username,
            user.email,
            user.file_count(),
            format_size(user.storage_used()),
            if user.has_admin_access() { "  admin" } else { "" }
        );
    }
    Ok(())
}

fn download_progress() -> ProgressFn {
    Arc::new(|received, total| match total {
        Some(total) if total > 0 => eprint!("\rDownloading... {:>3}%", received * 100 / total),
        _ => eprint!("\rDownloading... {}", format_size(received as i64)),
    })
}

/// Write a download to `output`, or to the server-provided name in the
/// current directory.
fn save_download(download: Download, output: Option<&Path>, fallback: &str) -> Result<PathBuf> {
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let name = download.file_name.as_deref().unwrap_or(fallback);
            // Never let a server-supplied name escape the current directory
            let name = Path::new(name)
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", name))?;
            PathBuf::from(name)
        }
    };
    std::fs::write(&path, &download.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn print_file(file: &StoredFile) {
    let downloaded = file
        .last_download
        .as_ref()
        .map(format_date)
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:>5}  {:<width$} {:>10}  {}  {}",
        file.id,
        truncate_string(&file.original_name, NAME_COLUMN_WIDTH),
        file.size_display(),
        format_date(&file.upload_date),
        downloaded,
        width = NAME_COLUMN_WIDTH
    );
    if !file.comment.is_empty() {
        println!("       {}", truncate_string(&file.comment, 70));
    }
}

fn print_user(user: &User) {
    println!("{} <{}>", user.display_name(), user.email);
    println!("Username: {}", user.username);
    println!("Files:    {} ({})", user.file_count(), format_size(user.storage_used()));
    if user.has_admin_access() {
        println!("Role:     administrator");
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
