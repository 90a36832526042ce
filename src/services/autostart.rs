use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

/// File name of the login entry written by [`XdgAutostart`]
pub const AUTOSTART_FILE_NAME: &str = "cleansweep.desktop";

#[derive(Error, Debug)]
pub enum AutostartError {
    #[error("Could not locate the user configuration directory")]
    NoConfigDirectory,

    #[error("Could not determine the current executable: {0}")]
    NoExecutable(#[source] io::Error),

    #[error("Failed to update login entry {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Registers the executable to run at user login.
///
/// The engine only queries and toggles this; the OS registration itself is
/// the source of truth and is never written to the settings file.
#[cfg_attr(test, mockall::automock)]
pub trait AutostartRegistrar: Send + Sync {
    fn enable(&self) -> Result<(), AutostartError>;
    fn disable(&self) -> Result<(), AutostartError>;
    fn is_enabled(&self) -> bool;
}

/// Registrar for hosts without a login-item mechanism
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAutostart;

impl AutostartRegistrar for DisabledAutostart {
    fn enable(&self) -> Result<(), AutostartError> {
        tracing::warn!("Autostart is not supported on this host");
        Ok(())
    }

    fn disable(&self) -> Result<(), AutostartError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// XDG autostart entry: `$XDG_CONFIG_HOME/autostart/cleansweep.desktop`
#[derive(Debug, Clone)]
pub struct XdgAutostart {
    entry_path: Utf8PathBuf,
    executable: Utf8PathBuf,
}

impl XdgAutostart {
    pub fn new(config_home: &Utf8Path, executable: impl Into<Utf8PathBuf>) -> Self {
        Self {
            entry_path: config_home.join("autostart").join(AUTOSTART_FILE_NAME),
            executable: executable.into(),
        }
    }

    /// Entry for the running binary under the user's config directory
    pub fn for_current_exe() -> Result<Self, AutostartError> {
        let config_home = dirs::config_dir()
            .and_then(|p| Utf8PathBuf::try_from(p).ok())
            .ok_or(AutostartError::NoConfigDirectory)?;
        let exe = std::env::current_exe().map_err(AutostartError::NoExecutable)?;
        let exe = Utf8PathBuf::try_from(exe).map_err(|e| {
            AutostartError::NoExecutable(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        Ok(Self::new(&config_home, exe))
    }

    pub fn entry_path(&self) -> &Utf8Path {
        &self.entry_path
    }

    fn desktop_entry(&self) -> String {
        format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name=CleanSweep\n\
             Comment=Sort new files into folders by type\n\
             Exec=\"{}\"\n\
             X-GNOME-Autostart-enabled=true\n\
             NoDisplay=true\n",
            self.executable
        )
    }

    fn io_err(&self, source: io::Error) -> AutostartError {
        AutostartError::Io {
            path: self.entry_path.clone(),
            source,
        }
    }
}

impl AutostartRegistrar for XdgAutostart {
    fn enable(&self) -> Result<(), AutostartError> {
        if let Some(parent) = self.entry_path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        fs::write(&self.entry_path, self.desktop_entry()).map_err(|e| self.io_err(e))?;
        tracing::info!("Enabled autostart via {}", self.entry_path);
        Ok(())
    }

    fn disable(&self) -> Result<(), AutostartError> {
        match fs::remove_file(&self.entry_path) {
            Ok(()) => {
                tracing::info!("Disabled autostart, removed {}", self.entry_path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn is_enabled(&self) -> bool {
        self.entry_path.exists()
    }
}
