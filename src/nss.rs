//! NSS security databases (Firefox profiles, Chrome/Chromium on Linux),
//! driven through NSS `certutil`.

use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ca::RootCa;
use crate::error::{Backend, Result, Warning};
use crate::exec::{Cmd, Output, System};
use crate::platform::{Outcome, TrustStore, NSS_BROWSERS};

/// Where to look for NSS databases.
#[derive(Debug, Clone, Default)]
pub struct NssConfig {
    /// Fixed database directories.
    pub databases: Vec<PathBuf>,
    /// Directories whose children are browser profiles.
    pub profile_roots: Vec<PathBuf>,
    /// Any of these existing means NSS is in use on this machine.
    pub browser_paths: Vec<PathBuf>,
}

impl NssConfig {
    /// Platform defaults for a user's home directory.
    pub fn for_home(home: &Path) -> Self {
        let databases = vec![
            home.join(".pki/nssdb"),
            home.join("snap/chromium/current/.pki/nssdb"),
            PathBuf::from("/etc/pki/nssdb"),
        ];

        #[cfg(target_os = "macos")]
        let profile_roots = vec![home.join("Library/Application Support/Firefox/Profiles")];
        #[cfg(windows)]
        let profile_roots = vec![home.join("AppData/Roaming/Mozilla/Firefox/Profiles")];
        #[cfg(not(any(target_os = "macos", windows)))]
        let profile_roots = vec![
            home.join(".mozilla/firefox"),
            home.join("snap/firefox/common/.mozilla/firefox"),
        ];

        let browser_paths = [
            "/usr/bin/firefox",
            "/usr/bin/firefox-nightly",
            "/usr/bin/firefox-developer-edition",
            "/snap/firefox",
            "/Applications/Firefox.app",
            "/Applications/FirefoxDeveloperEdition.app",
            "/Applications/Firefox Developer Edition.app",
            "/Applications/Firefox Nightly.app",
            "C:\\Program Files\\Mozilla Firefox",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();

        Self {
            databases,
            profile_roots,
            browser_paths,
        }
    }
}

/// The two NSS database generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbFormat {
    /// cert9.db, SQLite.
    Sql,
    /// cert8.db, Berkeley DB.
    Dbm,
}

impl DbFormat {
    fn marker(self) -> &'static str {
        match self {
            DbFormat::Sql => "cert9.db",
            DbFormat::Dbm => "cert8.db",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            DbFormat::Sql => "sql:",
            DbFormat::Dbm => "dbm:",
        }
    }
}

/// A discovered NSS database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub dir: PathBuf,
    pub format: DbFormat,
}

impl Profile {
    /// The `-d` argument for certutil.
    pub fn address(&self) -> String {
        format!("{}{}", self.format.prefix(), self.dir.display())
    }
}

#[derive(Debug)]
struct NssState {
    present: bool,
    certutil: Option<PathBuf>,
    install_hint: Option<String>,
}

pub struct NssStore {
    sys: Arc<dyn System>,
    config: NssConfig,
    state: OnceCell<NssState>,
}

impl NssStore {
    pub fn new(sys: Arc<dyn System>, config: NssConfig) -> Self {
        Self {
            sys,
            config,
            state: OnceCell::new(),
        }
    }

    fn state(&self) -> &NssState {
        self.state.get_or_init(|| {
            let present = self
                .config
                .databases
                .iter()
                .chain(&self.config.browser_paths)
                .any(|p| self.sys.path_exists(p));
            let state = NssState {
                present,
                certutil: self.find_certutil(),
                install_hint: self.install_hint(),
            };
            tracing::debug!(present, certutil = ?state.certutil, "NSS discovery");
            state
        })
    }

    #[cfg(target_os = "macos")]
    fn find_certutil(&self) -> Option<PathBuf> {
        if let Some(p) = self.sys.look_path("certutil") {
            return Some(p);
        }
        let brew_default = Path::new("/usr/local/opt/nss/bin/certutil");
        if self.sys.path_exists(brew_default) {
            return Some(brew_default.to_path_buf());
        }
        let out = self
            .sys
            .exec(&Cmd::new("brew").args(["--prefix", "nss"]))
            .ok()
            .filter(|o| o.success)?;
        let path = PathBuf::from(out.text().trim()).join("bin").join("certutil");
        self.sys.path_exists(&path).then_some(path)
    }

    #[cfg(windows)]
    fn find_certutil(&self) -> Option<PathBuf> {
        // certutil.exe on PATH is the unrelated Windows tool.
        None
    }

    #[cfg(not(any(target_os = "macos", windows)))]
    fn find_certutil(&self) -> Option<PathBuf> {
        self.sys.look_path("certutil")
    }

    #[cfg(target_os = "macos")]
    fn install_hint(&self) -> Option<String> {
        Some("brew install nss".to_string())
    }

    #[cfg(windows)]
    fn install_hint(&self) -> Option<String> {
        None
    }

    #[cfg(not(any(target_os = "macos", windows)))]
    fn install_hint(&self) -> Option<String> {
        [
            ("apt", "apt install libnss3-tools"),
            ("yum", "yum install nss-tools"),
            ("zypper", "zypper install mozilla-nss-tools"),
        ]
        .into_iter()
        .find(|(tool, _)| self.sys.look_path(tool).is_some())
        .map(|(_, hint)| hint.to_string())
    }

    fn no_certutil(&self) -> Outcome {
        Outcome::degraded(Warning::NoCertutil {
            browsers: NSS_BROWSERS.to_string(),
            install_hint: self.state().install_hint.clone(),
        })
    }

    /// Every candidate directory holding a cert9.db or cert8.db.
    pub fn profiles(&self) -> Vec<Profile> {
        let mut candidates = self.config.databases.clone();
        for root in &self.config.profile_roots {
            candidates.extend(self.sys.list_dir(root));
        }

        candidates
            .into_iter()
            .filter(|dir| self.sys.is_dir(dir))
            .filter_map(|dir| {
                [DbFormat::Sql, DbFormat::Dbm]
                    .into_iter()
                    .find(|f| self.sys.path_exists(&dir.join(f.marker())))
                    .map(|format| Profile { dir, format })
            })
            .collect()
    }

    fn has_ca(&self, certutil: &Path, profile: &Profile, ca: &RootCa) -> bool {
        let cmd = Cmd::new(certutil)
            .args(["-V", "-d"])
            .arg(profile.address())
            .args(["-u", "L", "-n"])
            .arg(ca.unique_name());
        matches!(self.sys.exec(&cmd), Ok(out) if out.success)
    }

    /// Retry once with privileges when the database was opened read-only.
    fn exec_certutil(&self, cmd: &Cmd) -> Result<Output> {
        let out = self.sys.exec(cmd)?;
        if !out.success && out.contains("SEC_ERROR_READ_ONLY") && !cfg!(windows) {
            tracing::debug!(command = %cmd, "NSS database is read-only, retrying with sudo");
            return self.sys.sudo_exec(cmd);
        }
        Ok(out)
    }
}

impl TrustStore for NssStore {
    fn backend(&self) -> Backend {
        Backend::Nss
    }

    fn display_name(&self) -> &str {
        NSS_BROWSERS
    }

    fn is_present(&self) -> bool {
        self.state().present
    }

    /// Trusted only when every discovered database has the CA.
    fn check(&self, ca: &RootCa) -> Result<Outcome> {
        let Some(certutil) = self.state().certutil.as_deref() else {
            return Ok(self.no_certutil());
        };
        let profiles = self.profiles();
        let all = !profiles.is_empty() && profiles.iter().all(|p| self.has_ca(certutil, p, ca));
        Ok(if all { Outcome::yes() } else { Outcome::no() })
    }

    fn install(&self, ca: &RootCa) -> Result<Outcome> {
        let Some(certutil) = self.state().certutil.as_deref() else {
            return Ok(self.no_certutil());
        };
        let profiles = self.profiles();
        if profiles.is_empty() {
            return Ok(Outcome::degraded(Warning::NoNssDatabase {
                browsers: NSS_BROWSERS.to_string(),
            }));
        }

        for profile in &profiles {
            let cmd = Cmd::new(certutil)
                .args(["-A", "-d"])
                .arg(profile.address())
                .args(["-t", "C,,", "-n"])
                .arg(ca.unique_name())
                .arg("-i")
                .arg(ca.cert_path().to_string_lossy());
            let out = self.exec_certutil(&cmd)?;
            cmd.expect_success(out, &format!("certutil -A -d {}", profile.address()))?;
            tracing::info!(profile = %profile.address(), "imported CA into NSS database");
        }

        if !self.check(ca)?.done {
            return Ok(Outcome::degraded(Warning::InstallVerificationFailed {
                browsers: NSS_BROWSERS.to_string(),
            }));
        }
        Ok(Outcome::yes())
    }

    fn uninstall(&self, ca: &RootCa) -> Result<Outcome> {
        let Some(certutil) = self.state().certutil.as_deref() else {
            return Ok(self.no_certutil());
        };
        for profile in self.profiles() {
            if !self.has_ca(certutil, &profile, ca) {
                continue;
            }
            let cmd = Cmd::new(certutil)
                .args(["-D", "-d"])
                .arg(profile.address())
                .arg("-n")
                .arg(ca.unique_name());
            let out = self.exec_certutil(&cmd)?;
            cmd.expect_success(out, &format!("certutil -D -d {}", profile.address()))?;
            tracing::info!(profile = %profile.address(), "deleted CA from NSS database");
        }
        Ok(Outcome::yes())
    }
}
