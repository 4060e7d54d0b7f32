use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use url::Url;

use crate::config::AppConfig;
use crate::markup;
use crate::notes::{NoteId, MAX_NOTES};
use crate::share;
use crate::sidebar::SidebarView;
use crate::storage::StorageHandle;
use crate::workspace::{BufferSurface, EditingSurface, Intent, Outcome, ShareImport, Workspace};

type CliWorkspace = Workspace<StorageHandle, BufferSurface>;

#[derive(Args, Debug, Clone, Default)]
pub struct TuiArgs {
    /// Launch URL; a `note` parameter in it is imported as a new note
    #[arg(long)]
    pub open: Option<String>,
}

impl TuiArgs {
    pub fn launch_url(&self) -> Result<Option<Url>> {
        self.open
            .as_deref()
            .map(|raw| Url::parse(raw).with_context(|| format!("parsing launch url {raw}")))
            .transpose()
    }
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Plain-text body for the note. If omitted, reads from stdin.
    #[arg(long)]
    pub content: Option<String>,
    /// Give the note a fixed title instead of deriving it from the body
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct OpenArgs {
    /// Share URL or bare share token
    pub input: String,
}

#[derive(Args, Debug, Clone)]
pub struct ShareArgs {
    /// Sidebar position (#n); defaults to the active note
    pub index: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// A .txt or .html document
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Sidebar position (#n); defaults to the active note
    pub index: Option<usize>,
    /// Directory to write the text file into
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct DuplicateArgs {
    /// Sidebar position (#n); defaults to the active note
    pub index: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ReplaceArgs {
    /// Literal text to look for; markup tags are never matched
    pub find: String,
    pub replacement: String,
    /// Sidebar position (#n); defaults to the active note
    #[arg(long)]
    pub index: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct PrefsArgs {
    #[arg(long)]
    pub dark_mode: Option<bool>,
    /// Make the editor read-only
    #[arg(long)]
    pub view_lock: Option<bool>,
}

pub fn list_notes(config: &AppConfig, storage: StorageHandle) -> Result<()> {
    let workspace = open_workspace(config, storage);
    print!("{}", format_sidebar(&workspace.sidebar()));
    Ok(())
}

pub fn new_note(config: &AppConfig, storage: StorageHandle, args: NewArgs) -> Result<()> {
    let body = match args.content {
        Some(body) => Some(body),
        None => read_stdin()?,
    };
    let mut workspace = open_workspace(config, storage);
    let output = run_new(&mut workspace, body.as_deref(), args.title)?;
    println!("{output}");
    Ok(())
}

pub fn open_shared(config: &AppConfig, storage: StorageHandle, args: OpenArgs) -> Result<()> {
    let mut workspace = open_workspace(config, storage);
    let output = run_open(&mut workspace, &args.input)?;
    println!("{output}");
    Ok(())
}

pub fn share_note(config: &AppConfig, storage: StorageHandle, args: ShareArgs) -> Result<()> {
    let workspace = open_workspace(config, storage);
    let base = config.share.base()?;
    let id = resolve_index(&workspace.sidebar(), args.index)?;
    let url = workspace
        .share_url(&base, id)
        .ok_or_else(|| anyhow!("note {id} disappeared"))?;
    println!("{url}");
    Ok(())
}

pub fn import_document(config: &AppConfig, storage: StorageHandle, args: ImportArgs) -> Result<()> {
    let text = fs::read_to_string(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;
    let file_name = args
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut workspace = open_workspace(config, storage);
    let id = workspace.import_document(&file_name, &text)?;
    println!("Imported {}", describe(&workspace.sidebar(), id));
    Ok(())
}

pub fn export_note(config: &AppConfig, storage: StorageHandle, args: ExportArgs) -> Result<()> {
    let workspace = open_workspace(config, storage);
    let id = resolve_index(&workspace.sidebar(), args.index)?;
    let exported = workspace
        .export(id)
        .ok_or_else(|| anyhow!("note {id} disappeared"))?;
    fs::create_dir_all(&args.dir)
        .with_context(|| format!("creating {}", args.dir.display()))?;
    let target = args.dir.join(&exported.file_name);
    fs::write(&target, exported.text)
        .with_context(|| format!("writing {}", target.display()))?;
    println!("Wrote {}", target.display());
    Ok(())
}

pub fn duplicate_note(config: &AppConfig, storage: StorageHandle, args: DuplicateArgs) -> Result<()> {
    let mut workspace = open_workspace(config, storage);
    let output = run_duplicate(&mut workspace, args.index)?;
    println!("{output}");
    Ok(())
}

pub fn replace_text(config: &AppConfig, storage: StorageHandle, args: ReplaceArgs) -> Result<()> {
    let mut workspace = open_workspace(config, storage);
    let output = run_replace(&mut workspace, &args)?;
    println!("{output}");
    Ok(())
}

pub fn preferences(config: &AppConfig, storage: StorageHandle, args: PrefsArgs) -> Result<()> {
    let mut workspace = open_workspace(config, storage);
    let output = run_prefs(&mut workspace, &args)?;
    print!("{output}");
    Ok(())
}

fn open_workspace(config: &AppConfig, storage: StorageHandle) -> CliWorkspace {
    let (workspace, _) = Workspace::open(storage, BufferSurface::new(), &config.auto_save, None);
    workspace
}

fn run_new(workspace: &mut CliWorkspace, body: Option<&str>, title: Option<String>) -> Result<String> {
    let id = match workspace.dispatch(Intent::NewNote, Instant::now())? {
        Outcome::Created(id) => id,
        other => bail!("unexpected outcome creating note: {other:?}"),
    };
    if let Some(body) = body.filter(|body| !body.trim().is_empty()) {
        workspace
            .surface_mut()
            .set_content(&markup::text_to_markup(body.trim_end()));
        workspace.flush()?;
    }
    if let Some(title) = title {
        workspace.dispatch(Intent::Rename { id, title }, Instant::now())?;
    }
    Ok(format!("Created {}", describe(&workspace.sidebar(), id)))
}

fn run_open(workspace: &mut CliWorkspace, input: &str) -> Result<String> {
    let token = share::token_from_input(input)
        .ok_or_else(|| anyhow!("no share token found in {input:?}"))?;
    match workspace.import_shared(&token) {
        ShareImport::Imported(id) => Ok(format!(
            "Imported shared note as {}",
            describe(&workspace.sidebar(), id)
        )),
        ShareImport::LimitReached => bail!("maximum number of notes ({MAX_NOTES}) reached"),
        ShareImport::Corrupt(err) => Err(err.into()),
    }
}

fn run_duplicate(workspace: &mut CliWorkspace, index: Option<usize>) -> Result<String> {
    let source = resolve_index(&workspace.sidebar(), index)?;
    match workspace.dispatch(Intent::Duplicate(source), Instant::now())? {
        Outcome::Duplicated(copy) => Ok(format!(
            "Duplicated as {}",
            describe(&workspace.sidebar(), copy)
        )),
        other => bail!("unexpected outcome duplicating note: {other:?}"),
    }
}

fn run_replace(workspace: &mut CliWorkspace, args: &ReplaceArgs) -> Result<String> {
    if args.find.is_empty() {
        bail!("nothing to find");
    }
    let now = Instant::now();
    let target = resolve_index(&workspace.sidebar(), args.index)?;
    workspace.dispatch(Intent::Select(target), now)?;
    let intent = Intent::Replace {
        find: args.find.clone(),
        replacement: args.replacement.clone(),
    };
    let count = match workspace.dispatch(intent, now)? {
        Outcome::Replaced { count } => count,
        Outcome::Ignored => bail!("the note is locked for viewing"),
        other => bail!("unexpected outcome replacing text: {other:?}"),
    };
    workspace.flush()?;
    Ok(format!(
        "Replaced {count} occurrence(s) in {}",
        describe(&workspace.sidebar(), target)
    ))
}

fn run_prefs(workspace: &mut CliWorkspace, args: &PrefsArgs) -> Result<String> {
    if let Some(enabled) = args.dark_mode {
        workspace.set_dark_mode(enabled)?;
    }
    if let Some(locked) = args.view_lock {
        workspace.set_view_locked(locked)?;
    }
    let mut out = String::new();
    writeln!(out, "dark mode: {}", on_off(workspace.dark_mode()))?;
    writeln!(out, "view lock: {}", on_off(workspace.view_locked()))?;
    Ok(out)
}

fn resolve_index(view: &SidebarView, index: Option<usize>) -> Result<NoteId> {
    match index {
        None => view
            .entries
            .iter()
            .find(|entry| entry.is_active)
            .map(|entry| entry.id)
            .ok_or_else(|| anyhow!("no active note")),
        Some(n) => n
            .checked_sub(1)
            .and_then(|idx| view.entries.get(idx))
            .map(|entry| entry.id)
            .ok_or_else(|| anyhow!("no note #{n}; there are {} notes", view.entries.len())),
    }
}

fn describe(view: &SidebarView, id: NoteId) -> String {
    view.entries
        .iter()
        .find(|entry| entry.id == id)
        .map(|entry| format!("{} {}", entry.label(), entry.title))
        .unwrap_or_else(|| format!("note {id}"))
}

fn format_sidebar(view: &SidebarView) -> String {
    let mut out = String::new();
    for entry in &view.entries {
        let marker = if entry.is_active { '*' } else { ' ' };
        let _ = writeln!(out, "{marker} {:<4}{}", entry.label(), entry.title);
    }
    let _ = write!(out, "{} notes", view.capacity_label());
    if view.limit_reached {
        out.push_str(" (limit reached)");
    }
    out.push('\n');
    out
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}
