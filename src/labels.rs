#[derive(Debug, Clone)]
pub struct Labels {
    pub app_title: &'static str,
    pub convert_step: &'static str,
    pub split_step: &'static str,
    pub save_step: &'static str,
    pub done: &'static str,
    pub document: &'static str,
    pub save_as: &'static str,
    pub preprocessing: &'static str,
    pub splitting: &'static str,
    pub uploading: &'static str,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            app_title: "RAGGen UI",
            convert_step: "Step 1. Conversion",
            split_step: "Step 2. Processing",
            save_step: "Step 3. Saving",
            done: "Done!",
            document: "Document",
            save_as: "Save as",
            preprocessing: "Preprocessing...",
            splitting: "Splitting...",
            uploading: "Uploading data...",
        }
    }
}

impl Labels {
    /// Display label for a settings field; unknown names are shown verbatim.
    pub fn field(&self, name: &str) -> String {
        let label = match name {
            "file" => self.document,
            "save" => self.save_as,
            "converter_command" => "Converter command",
            "languages" => "Languages",
            "force_ocr" => "Force OCR",
            "use_llm" => "Use LLM",
            "llm_base_url" => "LLM API URL",
            "llm_api_key" => "LLM API Key",
            "llm_model" => "LLM Model Name",
            "chunk_size" => "Chunk Size",
            "embed_metadata" => "Embed metadata",
            "include_title" => "Include title",
            "qdrant_url" => "Qdrant URL",
            "qdrant_key" => "Qdrant key",
            "sparse_model" => "Sparse model",
            "dense_model" => "Dense model",
            "dense_dimension" => "Dense vector size",
            "chunks_collection" => "Chunks collection",
            "docs_collection" => "Documents collection",
            other => other,
        };
        label.to_string()
    }

    pub fn format_unsupported(&self, extension: &str) -> String {
        format!("Format '{extension}' is not supported")
    }

    pub fn document_selected(&self, path: &str) -> String {
        format!("Document selected: {path}")
    }

    pub fn file_saved(&self, path: &str) -> String {
        format!("File saved to: {path}")
    }
}
