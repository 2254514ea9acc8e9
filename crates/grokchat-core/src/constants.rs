/// GrokChat centralized constants.
/// Model catalogue, endpoints, defaults and inclusion limits live here.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    /// One entry of the supported model catalogue.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModelInfo {
        /// Short key used on the command line (`--model grok4`).
        pub key: &'static str,
        /// Human readable name.
        pub name: &'static str,
        /// Model identifier sent to the API.
        pub model_name: &'static str,
        pub max_tokens: u32,
        pub timeout_secs: u64,
    }

    pub const GROK3: ModelInfo = ModelInfo {
        key: "grok3",
        name: "Grok 3",
        model_name: "grok-3-latest",
        max_tokens: 32768,
        timeout_secs: 300,
    };

    pub const GROK3_MINI: ModelInfo = ModelInfo {
        key: "grok3mini",
        name: "Grok 3 Mini",
        model_name: "grok-3-mini-latest",
        max_tokens: 32768,
        timeout_secs: 300,
    };

    pub const GROK4: ModelInfo = ModelInfo {
        key: "grok4",
        name: "Grok 4",
        model_name: "grok-4-latest",
        max_tokens: 32768,
        timeout_secs: 300,
    };

    pub const SUPPORTED_MODELS: &[ModelInfo] = &[GROK3, GROK3_MINI, GROK4];

    pub fn find(key: &str) -> Option<&'static ModelInfo> {
        SUPPORTED_MODELS.iter().find(|m| m.key == key)
    }

    /// Reverse lookup by API model id, used when only a persisted config is available.
    pub fn find_by_model_name(model_name: &str) -> Option<&'static ModelInfo> {
        SUPPORTED_MODELS.iter().find(|m| m.model_name == model_name)
    }

    pub fn keys() -> Vec<&'static str> {
        SUPPORTED_MODELS.iter().map(|m| m.key).collect()
    }
}

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const XAI_BASE_URL: &str = "https://api.x.ai";
    pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
}

// ─── Environment ──────────────────────────────────────────────────────────────

pub mod env {
    pub const API_KEY: &str = "GROK_API_KEY";
    pub const BASE_URL: &str = "GROKCHAT_BASE_URL";
    pub const HOME: &str = "GROKCHAT_HOME";
}

// ─── Default Settings ─────────────────────────────────────────────────────────

pub mod defaults {
    pub const TEMPERATURE: f64 = 0.0;
    pub const TOP_P: f64 = 1.0;
    pub const MAX_HISTORY_SIZE: usize = 1000;
    pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
    pub const AGENTS_DIR: &str = "agents";
}

// ─── History & Backups ────────────────────────────────────────────────────────

pub mod history {
    /// A rolling copy of the history is taken every this many appended turns.
    pub const BACKUP_INTERVAL: usize = 10;
    /// Rolling copies kept; destructive snapshots are never pruned automatically.
    pub const MAX_ROLLING_BACKUPS: usize = 10;
    pub const PREVIEW_CHARS: usize = 100;
    pub const SEARCH_RESULT_LIMIT: usize = 10;
    pub const DEFAULT_RECENT: usize = 5;
}

// ─── File Inclusion ───────────────────────────────────────────────────────────

pub mod inclusion {
    /// 2 MB per included file.
    pub const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

    /// Conventional subdirectories searched after the working directory.
    pub const SEARCH_DIRS: &[&str] = &[
        ".", "src", "lib", "scripts", "data", "documents", "files", "config", "configs",
    ];

    /// Extension-less file names that may still be included.
    pub const KNOWN_FILES: &[&str] = &["makefile", "dockerfile", "readme", "license", "changelog"];

    /// Lower-case extensions, without the leading dot.
    pub const SUPPORTED_EXTENSIONS: &[&str] = &[
        // Programming languages
        "py", "r", "js", "ts", "jsx", "tsx", "java", "c", "cpp", "cc", "cxx", "h", "hpp", "cs",
        "php", "rb", "go", "rs", "swift", "kt", "scala", "clj", "hs", "ml", "fs", "vb", "pl", "pm",
        "sh", "bash", "zsh", "fish", "ps1", "bat", "cmd", "sql", "html", "htm", "css", "scss",
        "sass", "less", "xml", "xsl", "xslt", "json", "yaml", "yml", "toml", "ini", "cfg", "conf",
        "properties", "env", "dockerfile", "docker", "makefile", "cmake", "gradle", "sbt", "pom",
        "lock", "mod", "sum",
        // Data and markup
        "md", "markdown", "rst", "tex", "latex", "csv", "tsv", "jsonl", "ndjson", "svg", "rss",
        "atom", "plist",
        // Configuration and infrastructure
        "tf", "tfvars", "hcl", "nomad", "consul", "vault", "k8s", "kubectl", "helm", "kustomize",
        "ansible", "inventory", "playbook",
        // Documentation and text
        "txt", "log", "out", "err", "trace", "debug", "info", "warn", "error", "readme", "license",
        "changelog", "authors", "contributors", "todo",
        // Notebooks and scripts
        "ipynb", "rmd", "qmd", "jl", "m", "octave",
        // Web and API
        "graphql", "gql", "rest", "http", "api", "postman", "insomnia",
        // Other useful formats
        "editorconfig", "gitignore", "gitattributes", "dockerignore", "eslintrc", "prettierrc",
        "babelrc", "webpack", "rollup", "vite", "parcel",
    ];
}
