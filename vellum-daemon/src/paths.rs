use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn vellum_root(home: &Path) -> PathBuf {
    home.join(".vellum")
}

pub fn socket_path(home: &Path) -> PathBuf {
    vellum_root(home).join(DAEMON_SOCKET)
}

pub fn jobs_dir(home: &Path) -> PathBuf {
    vellum_core::jobs::jobs_dir_at(home)
}
