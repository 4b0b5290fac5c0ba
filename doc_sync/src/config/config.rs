use crate::constants::{
    DEFAULT_DIRECTORY_FILE, DEFAULT_DOCUMENT_FILE, DEFAULT_EDITOR, DEFAULT_EDITOR_ARGS,
    DEFAULT_HISTORY_FILE,
};
use crate::err::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Workspace {
    pub working_dir: String,
    pub document_file: String,
    pub directory_file: String,
    pub history_file: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EditorConfig {
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub workspace: Workspace,
    pub editor: EditorConfig,
}

// Expand a leading '~/' so shell-like paths work in config files.
fn expand_tilde(p: &str) -> String {
    if let Some(rest) = p.strip_prefix("~/") {
        match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home, rest),
            Err(_) => p.to_string(),
        }
    } else {
        p.to_string()
    }
}

impl Config {
    pub fn new() -> Self {
        Config {
            workspace: Workspace {
                working_dir: String::from("."),
                document_file: String::from(DEFAULT_DOCUMENT_FILE),
                directory_file: String::from(DEFAULT_DIRECTORY_FILE),
                history_file: String::from(DEFAULT_HISTORY_FILE),
            },
            editor: EditorConfig {
                command: String::from(DEFAULT_EDITOR),
                args: DEFAULT_EDITOR_ARGS.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    pub fn from_config(config_path: &str) -> Result<Self> {
        let path = expand_tilde(config_path);
        let content = fs::read_to_string(&path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => Err(e.into()),
        }
    }

    pub fn dump(&self, config_path: &str) -> Result<()> {
        let path = PathBuf::from(expand_tilde(config_path));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let f = fs::File::create(&path)?;
        let mut writer = std::io::BufWriter::new(f);
        writer.write_all(toml::to_string(&self)?.as_bytes())?;
        Ok(())
    }

    pub fn working_dir(&self) -> PathBuf {
        PathBuf::from(expand_tilde(&self.workspace.working_dir))
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.working_dir().join(p)
        }
    }

    pub fn document_path(&self) -> PathBuf {
        self.resolve(&self.workspace.document_file)
    }

    pub fn directory_path(&self) -> PathBuf {
        self.resolve(&self.workspace.directory_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.resolve(&self.workspace.history_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the config at `path`, or write the defaults there and return them
/// when the file does not exist yet.
pub fn get_or_create_config(path: &str) -> Result<Config> {
    match Config::from_config(path) {
        Ok(config) => Ok(config),
        Err(_) => {
            let config = Config::new();
            config.dump(path)?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn unique_temp_path(file: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut p = env::temp_dir();
        p.push(format!("doc_sync_cfg_test_{}_{}", std::process::id(), nanos));
        p.push(file);
        p
    }

    #[test]
    fn dump_and_reload_round_trips() {
        let mut cfg = Config::new();
        cfg.workspace.working_dir = "/tmp/docshare".into();
        cfg.editor.command = "vi".into();
        cfg.editor.args.clear();

        let path = unique_temp_path("nested/docshare.toml");
        cfg.dump(path.to_str().unwrap()).expect("dump");

        let loaded = Config::from_config(path.to_str().unwrap()).expect("reload");
        assert_eq!(loaded.workspace.working_dir, "/tmp/docshare");
        assert_eq!(loaded.editor.command, "vi");
        assert!(loaded.editor.args.is_empty());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn get_or_create_writes_defaults_when_missing() {
        let path = unique_temp_path("fresh.toml");
        assert!(!path.exists());
        let cfg = get_or_create_config(path.to_str().unwrap()).expect("create");
        assert!(path.exists());
        assert_eq!(cfg.workspace.document_file, DEFAULT_DOCUMENT_FILE);
        assert_eq!(cfg.editor.command, DEFAULT_EDITOR);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn paths_resolve_against_working_dir() {
        let mut cfg = Config::new();
        cfg.workspace.working_dir = "/srv/share".into();
        assert_eq!(cfg.document_path(), PathBuf::from("/srv/share/shared_doc.txt"));
        assert_eq!(cfg.history_path(), PathBuf::from("/srv/share/history.txt"));

        cfg.workspace.history_file = "/var/log/history.txt".into();
        assert_eq!(cfg.history_path(), PathBuf::from("/var/log/history.txt"));
    }
}
