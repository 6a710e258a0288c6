//! External tool test utilities

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use release_checker::command::CommandRunner;
use release_checker::error::CommandError;

/// Stands in for `curl`, `fuseiso`, `fusermount`, `git` and `osc`
///
/// Downloads, mounts and clones touch the file system the way the real
/// tools would; every other command is answered from a table keyed by the
/// space-joined argv. Unscripted commands fail like a missing program.
#[derive(Default)]
pub struct FakeTools {
    responses: HashMap<String, Result<String, String>>,
    image_packages: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, command: &str, output: &str) -> Self {
        self.responses
            .insert(command.to_string(), Ok(output.to_string()));
        self
    }

    pub fn with_failure(mut self, command: &str, stderr: &str) -> Self {
        self.responses
            .insert(command.to_string(), Err(stderr.to_string()));
        self
    }

    /// Package list a mounted image exposes as `LiveOS/.packages.json`
    pub fn with_image_packages(mut self, json: &str) -> Self {
        self.image_packages = Some(json.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn simulate(&self, argv: &[&str]) -> Option<io::Result<()>> {
        match argv {
            ["curl", .., "-o", output, _url] => Some(fs::write(output, b"ISO 9660")),
            ["fuseiso", _image, mount_point] => {
                let json = self.image_packages.as_ref()?;
                let live = Path::new(mount_point).join("LiveOS");
                Some(
                    fs::create_dir_all(&live)
                        .and_then(|_| fs::write(live.join(".packages.json"), json)),
                )
            }
            ["fusermount", "-u", mount_point] => {
                let live = Path::new(mount_point).join("LiveOS");
                Some(if live.exists() {
                    fs::remove_dir_all(live)
                } else {
                    Ok(())
                })
            }
            ["git", "clone", "--mirror", _url, path] => Some(fs::create_dir_all(path)),
            _ => None,
        }
    }
}

#[async_trait]
impl CommandRunner for FakeTools {
    async fn run(&self, argv: &[&str]) -> Result<String, CommandError> {
        let key = argv.join(" ");
        self.calls.lock().unwrap().push(key.clone());
        let program = argv.first().copied().unwrap_or_default().to_string();

        match self.responses.get(&key) {
            Some(Ok(output)) => return Ok(output.clone()),
            Some(Err(stderr)) => {
                return Err(CommandError::Failed {
                    program,
                    status: "exit status: 1".to_string(),
                    stderr: stderr.clone(),
                });
            }
            None => {}
        }

        match self.simulate(argv) {
            Some(Ok(())) => Ok(String::new()),
            Some(Err(source)) => Err(CommandError::Spawn { program, source }),
            None => Err(CommandError::Spawn {
                program,
                source: io::Error::new(io::ErrorKind::NotFound, key),
            }),
        }
    }
}
