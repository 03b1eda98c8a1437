use crate::error::{PdfToolkitError, Result};
use crate::images::{images_to_document, ImagesToPdfOptions};
use crate::page_set::{
    extract_pages, merge_documents, remove_pages, reorder_pages, split_document, SplitOptions,
};
use crate::raster::{rasterize, RasterBackend, RasterImage, RasterOptions};
use crate::text::{extract_text, replace_text, ExtractedText, TextLayer, TextReplacement};
use crate::transform::{compress_document, flatten_document, rotate_pages, RotateOptions};
use crate::watermark::{add_watermark, WatermarkOptions};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PdfCommand {
    Merge {
        files: Vec<Vec<u8>>,
    },
    Split {
        file: Vec<u8>,
        options: SplitOptions,
    },
    Extract {
        file: Vec<u8>,
        pages: Vec<u32>,
    },
    Remove {
        file: Vec<u8>,
        pages: Vec<u32>,
    },
    Reorder {
        file: Vec<u8>,
        #[serde(rename = "pageOrder")]
        page_order: Vec<u32>,
    },
    Rotate {
        file: Vec<u8>,
        #[serde(default)]
        options: RotateOptions,
    },
    Flatten {
        file: Vec<u8>,
    },
    Compress {
        file: Vec<u8>,
    },
    Watermark {
        file: Vec<u8>,
        #[serde(default)]
        options: WatermarkOptions,
    },
    ExtractText {
        file: Vec<u8>,
    },
    ReplaceText {
        file: Vec<u8>,
        replacements: Vec<TextReplacement>,
    },
    Rasterize {
        file: Vec<u8>,
        #[serde(default)]
        options: RasterOptions,
    },
    ImagesToPdf {
        images: Vec<Vec<u8>>,
        #[serde(default)]
        options: ImagesToPdfOptions,
    },
}

impl PdfCommand {
    pub fn name(&self) -> &'static str {
        match self {
            PdfCommand::Merge { .. } => "merge",
            PdfCommand::Split { .. } => "split",
            PdfCommand::Extract { .. } => "extract",
            PdfCommand::Remove { .. } => "remove",
            PdfCommand::Reorder { .. } => "reorder",
            PdfCommand::Rotate { .. } => "rotate",
            PdfCommand::Flatten { .. } => "flatten",
            PdfCommand::Compress { .. } => "compress",
            PdfCommand::Watermark { .. } => "watermark",
            PdfCommand::ExtractText { .. } => "extract-text",
            PdfCommand::ReplaceText { .. } => "replace-text",
            PdfCommand::Rasterize { .. } => "rasterize",
            PdfCommand::ImagesToPdf { .. } => "images-to-pdf",
        }
    }

    /// Total size of the command's input files
    pub fn input_size(&self) -> usize {
        match self {
            PdfCommand::Merge { files } => files.iter().map(Vec::len).sum(),
            PdfCommand::ImagesToPdf { images, .. } => images.iter().map(Vec::len).sum(),
            PdfCommand::Split { file, .. }
            | PdfCommand::Extract { file, .. }
            | PdfCommand::Remove { file, .. }
            | PdfCommand::Reorder { file, .. }
            | PdfCommand::Rotate { file, .. }
            | PdfCommand::Flatten { file }
            | PdfCommand::Compress { file }
            | PdfCommand::Watermark { file, .. }
            | PdfCommand::ExtractText { file }
            | PdfCommand::ReplaceText { file, .. }
            | PdfCommand::Rasterize { file, .. } => file.len(),
        }
    }
}

/// Rendering capabilities supplied by the host
#[derive(Clone, Copy, Default)]
pub struct Capabilities<'a> {
    pub text_layer: Option<&'a dyn TextLayer>,
    pub raster: Option<&'a dyn RasterBackend>,
}

impl<'a> Capabilities<'a> {
    fn text_layer(&self) -> Result<&'a dyn TextLayer> {
        self.text_layer
            .ok_or_else(|| PdfToolkitError::EnvironmentError("no text layer available".into()))
    }

    fn raster(&self) -> Result<&'a dyn RasterBackend> {
        self.raster
            .ok_or_else(|| PdfToolkitError::EnvironmentError("no raster backend available".into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Document(Vec<u8>),
    Documents(Vec<Vec<u8>>),
    Text(ExtractedText),
    Images(Vec<RasterImage>),
}

impl CommandOutput {
    pub fn output_size(&self) -> usize {
        match self {
            CommandOutput::Document(bytes) => bytes.len(),
            CommandOutput::Documents(docs) => docs.iter().map(Vec::len).sum(),
            CommandOutput::Text(text) => text.items.iter().map(|item| item.text.len()).sum(),
            CommandOutput::Images(images) => images.iter().map(|image| image.bytes.len()).sum(),
        }
    }

    /// Pages in the output, or artifacts when the output is not one document
    pub fn page_count(&self) -> u32 {
        match self {
            CommandOutput::Document(bytes) => crate::get_page_count(bytes).unwrap_or(0),
            CommandOutput::Documents(docs) => docs.len() as u32,
            CommandOutput::Text(text) => text.page_count,
            CommandOutput::Images(images) => images.len() as u32,
        }
    }
}

/// Run one command to completion
pub fn execute(command: PdfCommand, capabilities: &Capabilities<'_>) -> Result<CommandOutput> {
    debug!(command = command.name(), input_size = command.input_size(), "executing command");

    let output = match command {
        PdfCommand::Merge { files } => CommandOutput::Document(merge_documents(files)?),
        PdfCommand::Split { file, options } => {
            CommandOutput::Documents(split_document(&file, &options)?)
        }
        PdfCommand::Extract { file, pages } => CommandOutput::Document(extract_pages(&file, &pages)?),
        PdfCommand::Remove { file, pages } => CommandOutput::Document(remove_pages(&file, &pages)?),
        PdfCommand::Reorder { file, page_order } => {
            CommandOutput::Document(reorder_pages(&file, &page_order)?)
        }
        PdfCommand::Rotate { file, options } => {
            CommandOutput::Document(rotate_pages(&file, &options)?)
        }
        PdfCommand::Flatten { file } => CommandOutput::Document(flatten_document(&file)?),
        PdfCommand::Compress { file } => CommandOutput::Document(compress_document(&file)?),
        PdfCommand::Watermark { file, options } => {
            CommandOutput::Document(add_watermark(&file, &options)?)
        }
        PdfCommand::ExtractText { file } => {
            CommandOutput::Text(extract_text(&file, capabilities.text_layer()?)?)
        }
        PdfCommand::ReplaceText { file, replacements } => CommandOutput::Document(replace_text(
            &file,
            &replacements,
            capabilities.text_layer()?,
        )?),
        PdfCommand::Rasterize { file, options } => {
            CommandOutput::Images(rasterize(&file, &options, capabilities.raster()?)?)
        }
        PdfCommand::ImagesToPdf { images, options } => {
            CommandOutput::Document(images_to_document(&images, &options)?)
        }
    };

    Ok(output)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    /// Base64-encoded PDF data
    pub data: Option<String>,
    /// Base64-encoded artifacts when the command yields several files
    pub parts: Vec<String>,
    pub text: Option<ExtractedText>,
    pub error: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: u32,
    pub processing_time_ms: u64,
}

impl ProcessResult {
    pub fn success(output: &CommandOutput, input_size_bytes: usize, processing_time_ms: u64) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        let (data, parts, text) = match output {
            CommandOutput::Document(bytes) => (Some(engine.encode(bytes)), Vec::new(), None),
            CommandOutput::Documents(docs) => {
                (None, docs.iter().map(|doc| engine.encode(doc)).collect(), None)
            }
            CommandOutput::Text(text) => (None, Vec::new(), Some(text.clone())),
            CommandOutput::Images(images) => (
                None,
                images.iter().map(|image| engine.encode(&image.bytes)).collect(),
                None,
            ),
        };

        Self {
            success: true,
            data,
            parts,
            text,
            error: None,
            metrics: Some(ProcessMetrics {
                input_size_bytes,
                output_size_bytes: output.output_size(),
                page_count: output.page_count(),
                processing_time_ms,
            }),
        }
    }

    pub fn failure(error: &PdfToolkitError) -> Self {
        Self {
            success: false,
            data: None,
            parts: Vec::new(),
            text: None,
            error: Some(error.to_string()),
            metrics: None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PdfToolkitError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_test_pdf, page_count};
    use crate::text::ContentStreamTextLayer;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_names_and_sizes() {
        let command = PdfCommand::Merge {
            files: vec![vec![0; 3], vec![0; 4]],
        };
        assert_eq!(command.name(), "merge");
        assert_eq!(command.input_size(), 7);
    }

    #[test]
    fn test_execute_merge() {
        let command = PdfCommand::Merge {
            files: vec![create_test_pdf(1), create_test_pdf(1)],
        };
        match execute(command, &Capabilities::default()).unwrap() {
            CommandOutput::Document(bytes) => assert_eq!(page_count(&bytes), 2),
            other => panic!("unexpected output {:?}", other.page_count()),
        }
    }

    #[test]
    fn test_execute_from_json_with_default_options() {
        let file = create_test_pdf(2);
        let json = serde_json::json!({ "type": "Rotate", "file": file }).to_string();
        let command: PdfCommand = serde_json::from_str(&json).unwrap();
        let output = execute(command, &Capabilities::default()).unwrap();
        assert_eq!(output.page_count(), 2);
    }

    #[test]
    fn test_extract_text_needs_text_layer() {
        let command = PdfCommand::ExtractText {
            file: create_test_pdf(1),
        };
        let err = execute(command, &Capabilities::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Environment);
    }

    #[test]
    fn test_extract_text_with_layer() {
        let layer = ContentStreamTextLayer;
        let capabilities = Capabilities {
            text_layer: Some(&layer),
            raster: None,
        };
        let command = PdfCommand::ExtractText {
            file: create_test_pdf(2),
        };
        match execute(command, &capabilities).unwrap() {
            CommandOutput::Text(text) => {
                assert_eq!(text.page_count, 2);
                assert_eq!(text.items.len(), 2);
            }
            other => panic!("unexpected output {:?}", other.page_count()),
        }
    }

    #[test]
    fn test_rasterize_needs_backend() {
        let command = PdfCommand::Rasterize {
            file: create_test_pdf(1),
            options: RasterOptions::default(),
        };
        let err = execute(command, &Capabilities::default()).unwrap_err();
        assert!(matches!(err, PdfToolkitError::EnvironmentError(_)));
    }

    #[test]
    fn test_process_result_envelope() {
        let output = CommandOutput::Documents(vec![create_test_pdf(1), create_test_pdf(1)]);
        let result = ProcessResult::success(&output, 10, 3);
        assert!(result.success);
        assert_eq!(result.parts.len(), 2);
        assert_eq!(result.metrics.as_ref().unwrap().page_count, 2);

        let json = result.to_json().unwrap();
        assert!(json.contains("\"success\":true"));

        let failure = ProcessResult::failure(&PdfToolkitError::NoExtractableText);
        assert!(!failure.success);
        assert!(failure.error.unwrap().contains("No text"));
    }
}
