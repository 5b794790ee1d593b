//! Fence language tags
//!
//! Maps a path to the syntax tag written after the opening fence. Purely
//! cosmetic: the reader ignores the tag. Matching is case-insensitive and
//! falls back to `text`.

/// Detect the fence language for a display path
pub fn detect(path: &str) -> &'static str {
    let name = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_lowercase();

    if let Some(tag) = by_file_name(&name) {
        return tag;
    }

    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() || !ext.is_empty() => by_extension(ext),
        _ => "text",
    }
}

fn by_file_name(name: &str) -> Option<&'static str> {
    let tag = match name {
        "dockerfile" | "containerfile" => "dockerfile",
        "makefile" | "gnumakefile" => "makefile",
        "cmakelists.txt" => "cmake",
        "jenkinsfile" => "groovy",
        "gemfile" | "rakefile" => "ruby",
        "cargo.lock" => "toml",
        _ if name == ".env" || name.starts_with(".env.") => "bash",
        _ if name.starts_with("dockerfile.") => "dockerfile",
        _ => return None,
    };
    Some(tag)
}

fn by_extension(ext: &str) -> &'static str {
    match ext {
        "py" | "pyw" | "pyi" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "tsx",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "m" => "objective-c",
        "r" => "r",
        "jl" => "julia",
        "lua" => "lua",
        "pl" | "pm" => "perl",
        "dart" => "dart",
        "elm" => "elm",
        "ex" | "exs" => "elixir",
        "erl" | "hrl" => "erlang",
        "clj" | "cljs" => "clojure",
        "fs" | "fsx" => "fsharp",
        "hs" => "haskell",
        "ml" => "ocaml",
        "v" => "verilog",
        "vhd" => "vhdl",
        "html" | "htm" => "html",
        "xml" | "svg" => "xml",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "less" => "less",
        "vue" => "vue",
        "svelte" => "svelte",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "ini" | "cfg" | "conf" | "editorconfig" => "ini",
        "csv" | "tsv" => "csv",
        "md" | "markdown" => "markdown",
        "rst" => "rst",
        "adoc" => "asciidoc",
        "sh" | "bash" | "env" => "bash",
        "zsh" => "zsh",
        "fish" => "fish",
        "ps1" | "psm1" => "powershell",
        "bat" | "cmd" => "batch",
        "sql" | "psql" | "mysql" | "pgsql" => "sql",
        "dockerfile" => "dockerfile",
        "properties" => "properties",
        "gradle" => "gradle",
        "makefile" => "makefile",
        "cmake" => "cmake",
        "proto" => "protobuf",
        "graphql" | "gql" => "graphql",
        "j2" | "jinja" | "jinja2" => "jinja2",
        "tf" | "tfvars" | "hcl" => "hcl",
        _ => "text",
    }
}
