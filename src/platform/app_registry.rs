use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::collaborators::{AppRegistry, RunningApp};
use crate::models::SenderIcon;

/// Minimum gap between two directory scans triggered by lookup misses.
const RESCAN_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Bundle {
    identifier: String,
    name: Option<String>,
    icon: Option<PathBuf>,
    path: PathBuf,
}

#[derive(Default)]
struct BundleIndex {
    /// Keyed by ASCII-lowercased identifier
    by_id: HashMap<String, Bundle>,
    scanned_at: Option<Instant>,
}

struct ProcessTable {
    system: System,
    /// Bundle identifier per pid, resolved once for the life of the pid.
    by_pid: HashMap<u32, Option<String>>,
}

/// Registered applications read from bundle `Info.plist` files, plus the
/// process table for "is it running".
pub struct SystemAppRegistry {
    roots: Vec<PathBuf>,
    rescan_after: Duration,
    bundles: RwLock<BundleIndex>,
    processes: Mutex<ProcessTable>,
}

impl SystemAppRegistry {
    pub fn new() -> Self {
        let mut roots = vec![
            PathBuf::from("/Applications"),
            PathBuf::from("/System/Applications"),
            PathBuf::from("/System/Library/CoreServices"),
        ];
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("Applications"));
        }
        Self::with_roots(roots)
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            rescan_after: RESCAN_AFTER,
            bundles: RwLock::new(BundleIndex::default()),
            processes: Mutex::new(ProcessTable {
                system: System::new(),
                by_pid: HashMap::new(),
            }),
        }
    }

    pub fn with_rescan_interval(mut self, rescan_after: Duration) -> Self {
        self.rescan_after = rescan_after;
        self
    }

    fn rescan(&self) {
        let mut found = HashMap::new();
        for root in &self.roots {
            scan_dir(root, 2, &mut found);
        }
        log::debug!("app registry indexed {} bundles", found.len());

        let mut index = self
            .bundles
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        index.by_id = found;
        index.scanned_at = Some(Instant::now());
    }

    /// Index hit, or a rescan when the index is cold or old enough that the
    /// app may have been installed since.
    fn bundle(&self, identifier: &str) -> Option<Bundle> {
        let key = identifier.to_ascii_lowercase();
        {
            let index = self
                .bundles
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(bundle) = index.by_id.get(&key) {
                return Some(bundle.clone());
            }
            if index
                .scanned_at
                .is_some_and(|at| at.elapsed() < self.rescan_after)
            {
                return None;
            }
        }

        self.rescan();
        self.bundles
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .by_id
            .get(&key)
            .cloned()
    }

    /// Running processes whose executable sits inside an app bundle, as
    /// (identifier, pid). Only executable paths are refreshed, and each pid's
    /// `Info.plist` is read once.
    fn running_bundles(&self) -> Vec<(String, u32)> {
        let mut guard = self
            .processes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let ProcessTable { system, by_pid } = &mut *guard;
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
        );

        let live: HashSet<u32> = system.processes().keys().map(|pid| pid.as_u32()).collect();
        by_pid.retain(|pid, _| live.contains(pid));

        let mut running = Vec::new();
        for (pid, process) in system.processes() {
            let identifier = by_pid.entry(pid.as_u32()).or_insert_with(|| {
                let bundle_path = process.exe().and_then(enclosing_bundle)?;
                read_bundle(&bundle_path).map(|bundle| bundle.identifier)
            });
            if let Some(identifier) = identifier {
                running.push((identifier.clone(), pid.as_u32()));
            }
        }
        running
    }
}

impl Default for SystemAppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AppRegistry for SystemAppRegistry {
    fn canonical_identifier(&self, raw: &str) -> Option<String> {
        if let Some(bundle) = self.bundle(raw) {
            return Some(bundle.identifier);
        }
        self.running_bundles()
            .into_iter()
            .map(|(identifier, _)| identifier)
            .find(|identifier| identifier.eq_ignore_ascii_case(raw))
    }

    fn display_name(&self, identifier: &str) -> Option<String> {
        self.bundle(identifier)?.name
    }

    fn icon(&self, identifier: &str) -> Option<SenderIcon> {
        self.bundle(identifier)?
            .icon
            .filter(|path| path.exists())
            .map(SenderIcon::File)
    }

    fn running_process(&self, identifier: &str) -> Option<RunningApp> {
        self.running_bundles()
            .into_iter()
            .find(|(running, _)| running.eq_ignore_ascii_case(identifier))
            .map(|(identifier, pid)| RunningApp { identifier, pid })
    }

    fn activate(&self, identifier: &str) -> Result<()> {
        #[cfg(target_os = "macos")]
        {
            use anyhow::Context;

            let status = std::process::Command::new("open")
                .arg("-b")
                .arg(identifier)
                .status()
                .with_context(|| format!("failed to activate {identifier}"))?;
            if !status.success() {
                anyhow::bail!("`open -b {identifier}` exited with {status}");
            }
            Ok(())
        }

        #[cfg(not(target_os = "macos"))]
        {
            match self.bundle(identifier) {
                Some(bundle) => anyhow::bail!(
                    "cannot activate {} at {} on this platform",
                    bundle.identifier,
                    bundle.path.display()
                ),
                None => anyhow::bail!("unknown application {identifier}"),
            }
        }
    }
}

fn scan_dir(dir: &Path, depth: usize, found: &mut HashMap<String, Bundle>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if is_bundle(&path) {
            if let Some(bundle) = read_bundle(&path) {
                found
                    .entry(bundle.identifier.to_ascii_lowercase())
                    .or_insert(bundle);
            }
        } else if depth > 1 {
            scan_dir(&path, depth - 1, found);
        }
    }
}

fn is_bundle(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "app")
}

fn enclosing_bundle(exe: &Path) -> Option<PathBuf> {
    exe.ancestors()
        .find(|ancestor| is_bundle(ancestor))
        .map(Path::to_path_buf)
}

fn read_bundle(bundle: &Path) -> Option<Bundle> {
    let info = plist::Value::from_file(bundle.join("Contents").join("Info.plist")).ok()?;
    let dict = info.as_dictionary()?;
    let string = |key: &str| {
        dict.get(key)
            .and_then(plist::Value::as_string)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let identifier = string("CFBundleIdentifier")?;
    let name = string("CFBundleDisplayName").or_else(|| string("CFBundleName"));
    let icon = string("CFBundleIconFile").map(|file| {
        let mut icon = bundle.join("Contents").join("Resources").join(file);
        if icon.extension().is_none() {
            icon.set_extension("icns");
        }
        icon
    });

    Some(Bundle {
        identifier,
        name,
        icon,
        path: bundle.to_path_buf(),
    })
}
