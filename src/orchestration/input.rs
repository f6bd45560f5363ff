use tracing::debug;

use crate::core::errors::InputError;
use crate::core::types::WidgetKeys;
use crate::utils::file_extension;

/// What one submission carried for each widget. An empty `uploads` or a
/// `None` camera means that widget was left untouched.
#[derive(Debug, Default)]
pub struct CollectedInput {
    pub uploads: Vec<(String, Vec<u8>)>,
    pub camera: Option<Vec<u8>>,
}

/// Gathers one submission's files from the two input widgets.
///
/// Only fields named after the session's current epoch are accepted: a form
/// rendered before a reset still carries the old widget names and is
/// ignored. Uploads keep their submission order; at most one camera capture
/// is kept.
pub struct InputCollector {
    keys: WidgetKeys,
    allowed_extensions: Vec<String>,
    uploads: Vec<(String, Vec<u8>)>,
    camera: Option<Vec<u8>>,
    ignored_fields: usize,
}

impl InputCollector {
    pub fn new(epoch: u64, allowed_extensions: &[String]) -> Self {
        Self {
            keys: WidgetKeys::for_epoch(epoch),
            allowed_extensions: allowed_extensions.to_vec(),
            uploads: Vec::new(),
            camera: None,
            ignored_fields: 0,
        }
    }

    /// Feed one multipart field
    pub fn accept_field(
        &mut self,
        field_name: &str,
        file_name: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<(), InputError> {
        let file_name = file_name.unwrap_or("").trim();

        // Browsers send an empty part for a file input nothing was chosen in
        if bytes.is_empty() && file_name.is_empty() {
            return Ok(());
        }

        if field_name == self.keys.uploader {
            self.accept_upload(file_name, bytes)
        } else if field_name == self.keys.camera {
            if bytes.is_empty() {
                return Err(InputError::EmptyUpload("camera capture".to_string()));
            }
            if self.camera.is_none() {
                self.camera = Some(bytes);
            } else {
                debug!("Ignoring extra camera capture");
                self.ignored_fields += 1;
            }
            Ok(())
        } else {
            debug!(
                "Ignoring field {:?} (current widgets: {}, {})",
                field_name, self.keys.uploader, self.keys.camera
            );
            self.ignored_fields += 1;
            Ok(())
        }
    }

    fn accept_upload(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<(), InputError> {
        let allowed = file_extension(file_name)
            .map(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
            .unwrap_or(false);
        if !allowed {
            return Err(InputError::ExtensionNotAllowed {
                file_name: file_name.to_string(),
                allowed: self.allowed_extensions.join(", "),
            });
        }
        if bytes.is_empty() {
            return Err(InputError::EmptyUpload(file_name.to_string()));
        }

        self.uploads.push((file_name.to_string(), bytes));
        Ok(())
    }

    /// Fields dropped because they named a stale widget or a second capture
    pub fn ignored_fields(&self) -> usize {
        self.ignored_fields
    }

    pub fn finish(self) -> CollectedInput {
        CollectedInput {
            uploads: self.uploads,
            camera: self.camera,
        }
    }
}
