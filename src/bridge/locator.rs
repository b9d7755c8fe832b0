//! Runtime and agent entrypoint discovery
//!
//! Desktop hosts often launch without the user's shell `PATH`, so the agent's
//! runtime and entry script are searched for in conventional install
//! locations. Candidate lists come from a [`CandidateProvider`] strategy, one
//! per OS family, and are evaluated lazily: the first existing file wins and
//! later candidates (including directory scans) are never touched.

use crate::config::AgentConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// What to look for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateSpec {
    /// Runtime executable name, without extension
    pub runtime: String,
    /// Package directory name under `node_modules` (may be scoped, `@org/name`)
    pub package: String,
    /// Entry script relative to the package directory
    pub entry_script: String,
}

impl From<&AgentConfig> for LocateSpec {
    fn from(config: &AgentConfig) -> Self {
        Self {
            runtime: config.runtime.clone(),
            package: config.package.clone(),
            entry_script: config.entry_script.clone(),
        }
    }
}

/// Host directories the providers derive candidates from
#[derive(Debug, Clone, Default)]
pub struct HostDirs {
    pub home: Option<PathBuf>,
    /// Install prefixes such as `/usr/local` (unix only)
    pub prefixes: Vec<PathBuf>,
    /// `NPM_CONFIG_PREFIX`
    pub npm_prefix: Option<PathBuf>,
    /// `NVM_DIR`
    pub nvm_dir: Option<PathBuf>,
    /// `%APPDATA%`
    pub app_data: Option<PathBuf>,
    /// `%LOCALAPPDATA%`
    pub local_app_data: Option<PathBuf>,
    /// `%ProgramFiles%` and `%ProgramFiles(x86)%`
    pub program_files: Vec<PathBuf>,
}

impl HostDirs {
    /// Read directories from the current process environment
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            home: dirs_next::home_dir(),
            prefixes: vec![
                PathBuf::from("/opt/homebrew"),
                PathBuf::from("/usr/local"),
                PathBuf::from("/usr"),
            ],
            npm_prefix: var("NPM_CONFIG_PREFIX"),
            nvm_dir: var("NVM_DIR"),
            app_data: var("APPDATA"),
            local_app_data: var("LOCALAPPDATA"),
            program_files: ["ProgramFiles", "ProgramFiles(x86)"]
                .iter()
                .filter_map(|name| var(*name))
                .collect(),
        }
    }
}

/// Ordered candidate source for one OS family
pub trait CandidateProvider: Send + Sync {
    /// Possible runtime executables, most preferred first
    fn runtime_candidates<'a>(
        &'a self,
        spec: &'a LocateSpec,
    ) -> Box<dyn Iterator<Item = PathBuf> + 'a>;

    /// Possible agent entry scripts, most preferred first
    fn entrypoint_candidates<'a>(
        &'a self,
        spec: &'a LocateSpec,
    ) -> Box<dyn Iterator<Item = PathBuf> + 'a>;
}

// =============================================================================
// Unix family (Linux, macOS)
// =============================================================================

/// Homebrew, system prefixes, npm global prefix, then per-user tool managers
#[derive(Debug, Clone)]
pub struct UnixCandidates {
    dirs: HostDirs,
}

impl UnixCandidates {
    pub fn new(dirs: HostDirs) -> Self {
        Self { dirs }
    }

    fn nvm_root(&self) -> Option<PathBuf> {
        self.dirs
            .nvm_dir
            .clone()
            .or_else(|| self.dirs.home.as_ref().map(|h| h.join(".nvm")))
    }
}

impl CandidateProvider for UnixCandidates {
    fn runtime_candidates<'a>(
        &'a self,
        spec: &'a LocateSpec,
    ) -> Box<dyn Iterator<Item = PathBuf> + 'a> {
        let mut bins: Vec<PathBuf> = self.dirs.prefixes.iter().map(|p| p.join("bin")).collect();
        if let Some(prefix) = &self.dirs.npm_prefix {
            bins.push(prefix.join("bin"));
        }
        if let Some(home) = &self.dirs.home {
            bins.push(home.join(".volta").join("bin"));
            bins.push(home.join(".asdf").join("shims"));
            bins.push(home.join(".local").join("bin"));
        }

        let fixed = bins.into_iter().map(move |dir| dir.join(&spec.runtime));
        let nvm = lazily(move || {
            self.nvm_root()
                .map(|root| versioned_dirs(&root.join("versions").join("node")))
                .unwrap_or_default()
                .into_iter()
                .map(|version| version.join("bin").join(&spec.runtime))
                .collect()
        });
        Box::new(fixed.chain(nvm))
    }

    fn entrypoint_candidates<'a>(
        &'a self,
        spec: &'a LocateSpec,
    ) -> Box<dyn Iterator<Item = PathBuf> + 'a> {
        let mut module_roots = Vec::new();
        if let Some(prefix) = &self.dirs.npm_prefix {
            module_roots.push(prefix.join("lib").join("node_modules"));
        }
        if let Some(home) = &self.dirs.home {
            module_roots.push(home.join(".npm-global").join("lib").join("node_modules"));
        }
        for prefix in &self.dirs.prefixes {
            module_roots.push(prefix.join("lib").join("node_modules"));
        }
        if let Some(home) = &self.dirs.home {
            module_roots.push(home.join(".bun").join("install").join("global").join("node_modules"));
        }

        let fixed = module_roots
            .into_iter()
            .map(move |root| package_script(&root, spec));
        let volta = lazily(move || {
            self.dirs
                .home
                .as_ref()
                .map(|home| {
                    let image = join_package(
                        &home.join(".volta").join("tools").join("image").join("packages"),
                        &spec.package,
                    );
                    vec![package_script(&image.join("lib").join("node_modules"), spec)]
                })
                .unwrap_or_default()
        });
        let nvm = lazily(move || {
            self.nvm_root()
                .map(|root| versioned_dirs(&root.join("versions").join("node")))
                .unwrap_or_default()
                .into_iter()
                .map(|version| package_script(&version.join("lib").join("node_modules"), spec))
                .collect()
        });
        Box::new(fixed.chain(volta).chain(nvm))
    }
}

// =============================================================================
// Windows family
// =============================================================================

/// Program Files, npm's roaming prefix, nvm-windows, Volta, then Scoop
#[derive(Debug, Clone)]
pub struct WindowsCandidates {
    dirs: HostDirs,
}

impl WindowsCandidates {
    pub fn new(dirs: HostDirs) -> Self {
        Self { dirs }
    }
}

impl CandidateProvider for WindowsCandidates {
    fn runtime_candidates<'a>(
        &'a self,
        spec: &'a LocateSpec,
    ) -> Box<dyn Iterator<Item = PathBuf> + 'a> {
        let exe = format!("{}.exe", spec.runtime);

        let mut dirs: Vec<PathBuf> = self
            .dirs
            .program_files
            .iter()
            .map(|pf| pf.join("nodejs"))
            .collect();
        if let Some(local) = &self.dirs.local_app_data {
            dirs.push(local.join("Volta").join("bin"));
        }
        if let Some(home) = &self.dirs.home {
            dirs.push(home.join("scoop").join("apps").join("nodejs").join("current"));
            dirs.push(home.join("scoop").join("shims"));
        }

        let exe_for_fixed = exe.clone();
        let fixed = dirs.into_iter().map(move |dir| dir.join(&exe_for_fixed));
        let nvm = lazily(move || {
            self.dirs
                .app_data
                .as_ref()
                .map(|app| versioned_dirs(&app.join("nvm")))
                .unwrap_or_default()
                .into_iter()
                .map(|version| version.join(&exe))
                .collect()
        });
        Box::new(fixed.chain(nvm))
    }

    fn entrypoint_candidates<'a>(
        &'a self,
        spec: &'a LocateSpec,
    ) -> Box<dyn Iterator<Item = PathBuf> + 'a> {
        let mut module_roots = Vec::new();
        if let Some(prefix) = &self.dirs.npm_prefix {
            module_roots.push(prefix.join("node_modules"));
        }
        if let Some(app) = &self.dirs.app_data {
            module_roots.push(app.join("npm").join("node_modules"));
        }
        for pf in &self.dirs.program_files {
            module_roots.push(pf.join("nodejs").join("node_modules"));
        }
        if let Some(home) = &self.dirs.home {
            module_roots.push(
                home.join("scoop")
                    .join("persist")
                    .join("nodejs")
                    .join("bin")
                    .join("node_modules"),
            );
        }

        let fixed = module_roots
            .into_iter()
            .map(move |root| package_script(&root, spec));
        let nvm = lazily(move || {
            self.dirs
                .app_data
                .as_ref()
                .map(|app| versioned_dirs(&app.join("nvm")))
                .unwrap_or_default()
                .into_iter()
                .map(|version| package_script(&version.join("node_modules"), spec))
                .collect()
        });
        Box::new(fixed.chain(nvm))
    }
}

// =============================================================================
// Locator
// =============================================================================

/// Resolves runtime and entrypoint paths through a candidate provider
pub struct PathLocator {
    provider: Box<dyn CandidateProvider>,
    spec: LocateSpec,
}

impl PathLocator {
    pub fn new(provider: Box<dyn CandidateProvider>, spec: LocateSpec) -> Self {
        Self { provider, spec }
    }

    /// Locator using the provider for the compiled OS family
    pub fn for_host(spec: LocateSpec) -> Self {
        let dirs = HostDirs::from_env();
        let provider: Box<dyn CandidateProvider> = if cfg!(windows) {
            Box::new(WindowsCandidates::new(dirs))
        } else {
            Box::new(UnixCandidates::new(dirs))
        };
        Self::new(provider, spec)
    }

    /// First existing runtime executable, if any
    pub fn locate_runtime(&self) -> Option<PathBuf> {
        first_existing(self.provider.runtime_candidates(&self.spec), "runtime")
    }

    /// First existing agent entry script, if any
    pub fn locate_entrypoint(&self) -> Option<PathBuf> {
        first_existing(self.provider.entrypoint_candidates(&self.spec), "entrypoint")
    }
}

fn first_existing(candidates: impl Iterator<Item = PathBuf>, what: &str) -> Option<PathBuf> {
    for candidate in candidates {
        if candidate.is_file() {
            tracing::debug!(kind = what, path = %candidate.display(), "Located agent component");
            return Some(candidate);
        }
    }
    tracing::debug!(kind = what, "No install location matched");
    None
}

// =============================================================================
// Launch command resolution
// =============================================================================

/// How the agent process is launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// `<runtime> <script> <args..>`
    Script { runtime: PathBuf, script: PathBuf },
    /// User-supplied executable override
    Executable(PathBuf),
    /// Bare command name resolved through `PATH`
    Bare(String),
}

impl Launch {
    /// Resolve the launch command for `config`.
    ///
    /// An explicit `executable_path` wins outright. Otherwise runtime and
    /// entry script are taken from config or discovery (explicit first),
    /// and the bare command name is the last resort.
    pub fn resolve(config: &AgentConfig, locator: Option<&PathLocator>) -> Self {
        if let Some(path) = &config.executable_path {
            return Launch::Executable(path.clone());
        }

        let locator = locator.filter(|_| !config.disable_discovery);
        let runtime = config
            .runtime_path
            .clone()
            .or_else(|| locator.and_then(PathLocator::locate_runtime));
        let script = config
            .entrypoint_path
            .clone()
            .or_else(|| locator.and_then(PathLocator::locate_entrypoint));

        match (runtime, script) {
            (Some(runtime), Some(script)) => Launch::Script { runtime, script },
            _ => Launch::Bare(config.command.clone()),
        }
    }

    pub fn program(&self) -> OsString {
        match self {
            Launch::Script { runtime, .. } => runtime.clone().into_os_string(),
            Launch::Executable(path) => path.clone().into_os_string(),
            Launch::Bare(name) => OsString::from(name),
        }
    }

    /// Arguments that precede the configured agent args
    pub fn leading_args(&self) -> Vec<OsString> {
        match self {
            Launch::Script { script, .. } => vec![script.clone().into_os_string()],
            Launch::Executable(_) | Launch::Bare(_) => Vec::new(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Launch::Script { runtime, script } => {
                format!("{} {}", runtime.display(), script.display())
            }
            Launch::Executable(path) => path.display().to_string(),
            Launch::Bare(name) => name.clone(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Defer building a candidate batch until the iterator reaches it
fn lazily<'a, F>(build: F) -> impl Iterator<Item = PathBuf> + 'a
where
    F: FnOnce() -> Vec<PathBuf> + 'a,
{
    std::iter::once(build).flat_map(|f| f())
}

/// Subdirectories of `root`, newest version name first
fn versioned_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort_by(|a, b| version_key(b).cmp(&version_key(a)));
    dirs
}

fn version_key(path: &Path) -> Vec<u64> {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .trim_start_matches('v')
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

fn join_package(root: &Path, package: &str) -> PathBuf {
    package
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

fn package_script(module_root: &Path, spec: &LocateSpec) -> PathBuf {
    join_package(module_root, &spec.package).join(&spec.entry_script)
}
