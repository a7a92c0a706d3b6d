// Signature verification via an external cosign binary
//
// The verification itself (signature transport, trust policy, key handling)
// is entirely up to the external tool. This module only builds the fixed
// argument list, runs it, and turns the outcome into a boolean.

mod process;

pub use process::{ProcessOutput, ProcessRunner, TokioProcessRunner};

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::image::ImageReference;

/// Why a verification run did not succeed
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("verification timed out after {0:?}")]
    TimedOut(Duration),

    #[error("verification rejected (exit status {status:?}): {stderr}")]
    Rejected { status: Option<i32>, stderr: String },
}

/// Locations and limits for the verification binary
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierSettings {
    pub cosign_path: PathBuf,
    pub public_key_path: PathBuf,
    pub timeout: Duration,
}

/// Checks image signatures by invoking `cosign verify --key <key> <image>`
#[derive(Clone)]
pub struct Verifier {
    runner: Arc<dyn ProcessRunner>,
    settings: VerifierSettings,
}

impl Verifier {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: VerifierSettings) -> Self {
        Self { runner, settings }
    }

    /// Argument list passed to the verification binary for one image
    pub fn args(&self, image: &ImageReference) -> Vec<OsString> {
        vec![
            "verify".into(),
            "--key".into(),
            self.settings.public_key_path.clone().into_os_string(),
            image.repo_tag.clone().into(),
        ]
    }

    /// Run the verification binary for one image
    pub async fn check(&self, image: &ImageReference) -> Result<(), VerifyError> {
        let args = self.args(image);

        let output = self
            .runner
            .run(&self.settings.cosign_path, &args, self.settings.timeout)
            .await?;

        debug!(
            image = %image.repo_tag,
            stdout = %output.stdout.trim(),
            stderr = %output.stderr.trim(),
            "Signature verified"
        );
        Ok(())
    }

    /// Verify one image and record the result on it
    ///
    /// Every failure is downgraded to `false`; unsigned images are the common
    /// case and must not abort the rest of the list.
    pub async fn apply(&self, image: &mut ImageReference) -> bool {
        image.verified = match self.check(image).await {
            Ok(()) => true,
            Err(VerifyError::Rejected { status, stderr }) => {
                debug!(
                    image = %image.repo_tag,
                    status = ?status,
                    stderr = %stderr,
                    "Signature not verified"
                );
                false
            }
            Err(e) => {
                warn!(image = %image.repo_tag, "Could not verify signature: {}", e);
                false
            }
        };
        image.verified
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Runner that succeeds only for an allow-listed set of images
    ///
    /// The image is the last argument of the invocation. Tracks every call
    /// and the peak number of concurrent runs.
    #[derive(Default)]
    pub(crate) struct FakeRunner {
        signed: Mutex<HashSet<String>>,
        pub(crate) calls: Mutex<Vec<(String, Vec<String>)>>,
        in_flight: AtomicUsize,
        pub(crate) peak: AtomicUsize,
        pub(crate) delay: Duration,
    }

    impl FakeRunner {
        pub(crate) fn signed(images: &[&str]) -> Self {
            Self {
                signed: Mutex::new(images.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn set_signed(&self, images: &[&str]) {
            *self.signed.lock().unwrap() = images.iter().map(|s| s.to_string()).collect();
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn run(
            &self,
            program: &Path,
            args: &[OsString],
            _timeout: Duration,
        ) -> Result<ProcessOutput, VerifyError> {
            self.calls.lock().unwrap().push((
                program.display().to_string(),
                args.iter().map(|a| a.to_string_lossy().into_owned()).collect(),
            ));

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let image = args
                .last()
                .map(|a| a.to_string_lossy().into_owned())
                .unwrap_or_default();
            if self.signed.lock().unwrap().contains(&image) {
                Ok(ProcessOutput::default())
            } else {
                Err(VerifyError::Rejected {
                    status: Some(1),
                    stderr: "no matching signatures".to_string(),
                })
            }
        }
    }

    /// Runner whose binary can never be started
    pub(crate) struct MissingBinary;

    #[async_trait]
    impl ProcessRunner for MissingBinary {
        async fn run(
            &self,
            program: &Path,
            _args: &[OsString],
            _timeout: Duration,
        ) -> Result<ProcessOutput, VerifyError> {
            Err(VerifyError::Spawn {
                program: program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        }
    }

    pub(crate) fn settings() -> VerifierSettings {
        VerifierSettings {
            cosign_path: PathBuf::from("/data/bin/linux/cosign"),
            public_key_path: PathBuf::from("/data/cosign.pub"),
            timeout: Duration::from_secs(30),
        }
    }
}
