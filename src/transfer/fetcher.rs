// Remote fetcher: pulls clips from a host over ssh/scp into a raw folder
// and deletes each remote copy once it has landed.

use std::path::{Path, PathBuf};

use super::{run_logged, CommandRunner};
use crate::config::FetchSettings;
use crate::footage::classify::is_proper_name;

pub struct Fetcher<'a> {
    ssh: PathBuf,
    scp: PathBuf,
    remote: &'a FetchSettings,
    raw_dir: PathBuf,
    runner: &'a dyn CommandRunner,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        ssh: impl Into<PathBuf>,
        scp: impl Into<PathBuf>,
        remote: &'a FetchSettings,
        raw_dir: impl Into<PathBuf>,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            ssh: ssh.into(),
            scp: scp.into(),
            remote,
            raw_dir: raw_dir.into(),
            runner,
        }
    }

    fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.remote.source_dir.trim_end_matches('/'), name)
    }

    /// Names in the remote folder. A failed listing is logged and empty.
    pub fn list_remote(&self) -> Vec<String> {
        let args = vec![
            self.remote.host.clone(),
            "ls".to_string(),
            self.remote.source_dir.clone(),
        ];
        match run_logged(self.runner, &self.ssh, &args) {
            Some(outcome) => outcome
                .stdout
                .split_whitespace()
                .map(String::from)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn fetch_file(&self, name: &str) -> bool {
        let args = vec![
            format!("{}:{}", self.remote.host, self.remote_path(name)),
            path_arg(&self.raw_dir),
        ];
        run_logged(self.runner, &self.scp, &args).is_some()
    }

    pub fn remove_remote(&self, name: &str) -> bool {
        let args = vec![
            self.remote.host.clone(),
            "rm".to_string(),
            self.remote_path(name),
        ];
        run_logged(self.runner, &self.ssh, &args).is_some()
    }

    /// Fetch every proper remote file. Returns how many were fetched.
    pub fn run_cycle(&self) -> usize {
        let mut fetched = 0;

        for name in self.list_remote() {
            log::debug!("Found remote file {}", name);
            if !is_proper_name(&name) {
                log::warn!("Remote file '{}' has invalid name, skipping", name);
                continue;
            }
            if self.fetch_file(&name) {
                fetched += 1;
                self.remove_remote(&name);
            }
        }

        fetched
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::fakes::{failed, ok_with_stdout, FakeRunner};

    fn remote() -> FetchSettings {
        FetchSettings {
            host: "pi@car.local".to_string(),
            source_dir: "/home/pi/Upload/".to_string(),
        }
    }

    #[test]
    fn test_fetches_proper_files_and_removes_them() {
        let settings = remote();
        let runner = FakeRunner::scripted(vec![ok_with_stdout(
            "2021-05-01_12-34-56-front.mp4\nnotes.txt\n",
        )]);
        let fetcher = Fetcher::new("ssh", "scp", &settings, "/f/Raw", &runner);

        assert_eq!(fetcher.run_cycle(), 1);

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].1, vec!["pi@car.local", "ls", "/home/pi/Upload/"]);
        assert_eq!(calls[1].0, PathBuf::from("scp"));
        assert_eq!(
            calls[1].1,
            vec!["pi@car.local:/home/pi/Upload/2021-05-01_12-34-56-front.mp4", "/f/Raw"]
        );
        assert_eq!(
            calls[2].1,
            vec!["pi@car.local", "rm", "/home/pi/Upload/2021-05-01_12-34-56-front.mp4"]
        );
    }

    #[test]
    fn test_failed_copy_keeps_remote_file() {
        let settings = remote();
        let runner = FakeRunner::scripted(vec![
            ok_with_stdout("2021-05-01_12-34-56-back.mp4"),
            failed("scp: connection lost"),
        ]);
        let fetcher = Fetcher::new("ssh", "scp", &settings, "/f/Raw", &runner);

        assert_eq!(fetcher.run_cycle(), 0);
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_failed_listing_fetches_nothing() {
        let settings = remote();
        let runner = FakeRunner::scripted(vec![failed("ssh: Could not resolve hostname")]);
        let fetcher = Fetcher::new("ssh", "scp", &settings, "/f/Raw", &runner);

        assert!(fetcher.list_remote().is_empty());
        assert_eq!(runner.calls().len(), 1);
    }
}
