//! Cross-language bridge detection
//!
//! A bridge is a call site that leaves the current language: a generated
//! gRPC client, an HTTP request, or a spawned process/script. Detection is
//! line-local and stateless; several pattern families may fire on one line.

use crate::language::Language;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeKind {
    Grpc,
    Http,
    Spawn,
    ScriptInvoke,
}

impl BridgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeKind::Grpc => "grpc",
            BridgeKind::Http => "http",
            BridgeKind::Spawn => "spawn",
            BridgeKind::ScriptInvoke => "script_invoke",
        }
    }

    pub fn relationship_kind(&self) -> crate::RelationshipKind {
        use crate::RelationshipKind;
        match self {
            BridgeKind::Grpc => RelationshipKind::GrpcCalls,
            BridgeKind::Http => RelationshipKind::HttpCalls,
            BridgeKind::Spawn => RelationshipKind::Spawns,
            BridgeKind::ScriptInvoke => RelationshipKind::InvokesScript,
        }
    }
}

/// Fixed confidence per pattern family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfidence {
    /// Generated gRPC client constructors (Go, Rust, Java)
    pub grpc_client: f32,
    /// gRPC stubs / JS clients
    pub grpc_stub: f32,
    /// HTTP client calls with an explicit verb
    pub http_client: f32,
    /// fetch()-style calls
    pub http_fetch: f32,
    pub spawn: f32,
    pub script_invoke: f32,
}

impl Default for BridgeConfidence {
    fn default() -> Self {
        Self {
            grpc_client: 0.9,
            grpc_stub: 0.85,
            http_client: 0.8,
            http_fetch: 0.75,
            spawn: 0.7,
            script_invoke: 0.85,
        }
    }
}

/// A detected cross-language call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeCandidate {
    pub kind: BridgeKind,
    pub target_endpoint: String,
    pub confidence: f32,
    /// 1-indexed line the candidate was found on
    pub line: u32,
    pub column: u32,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
enum Family {
    GrpcClient,
    GrpcStub,
    HttpClient,
    HttpFetch,
    Process,
}

struct PatternFamily {
    name: &'static str,
    family: Family,
    /// Empty means every language
    languages: &'static [Language],
    regex: Regex,
}

fn family(name: &'static str, family: Family, languages: &'static [Language], pattern: &str) -> PatternFamily {
    PatternFamily {
        name,
        family,
        languages,
        regex: Regex::new(pattern).expect("bridge pattern is valid"),
    }
}

const JS: &[Language] = &[Language::JavaScript, Language::TypeScript];

static FAMILIES: LazyLock<Vec<PatternFamily>> = LazyLock::new(|| {
    vec![
        // gRPC
        family("go_grpc_client", Family::GrpcClient, &[Language::Go],
            r"\bNew([A-Z][A-Za-z0-9_]*?)ServiceClient\s*\("),
        family("rust_grpc_client", Family::GrpcClient, &[Language::Rust],
            r"\b([A-Z][A-Za-z0-9_]*?)ServiceClient(?:<[^>]*>)?::(?:connect|new|with_origin|with_interceptor)\b"),
        family("java_grpc_stub", Family::GrpcClient, &[Language::Java],
            r"\b([A-Z][A-Za-z0-9_]*?)(?:Service)?Grpc\.new(?:Blocking|Future)?Stub\s*\("),
        family("python_grpc_stub", Family::GrpcStub, &[Language::Python],
            r"\b([A-Z][A-Za-z0-9_]*?)(?:Service)?Stub\s*\("),
        family("js_grpc_client", Family::GrpcStub, JS,
            r"\bnew\s+(?:[\w$]+\.)*([A-Z][A-Za-z0-9_]*?)ServiceClient\s*\("),
        // HTTP
        family("js_axios", Family::HttpClient, JS,
            r#"\baxios\.(get|post|put|delete|patch)\s*\(\s*[`'"]([^`'"]+)"#),
        family("js_fetch", Family::HttpFetch, JS,
            r#"\bfetch\s*\(\s*[`'"]([^`'"]+)"#),
        family("python_requests", Family::HttpClient, &[Language::Python],
            r#"\b(?:requests|httpx)\.(get|post|put|delete|patch)\s*\(\s*f?["']([^"']+)"#),
        family("go_http", Family::HttpClient, &[Language::Go],
            r#"\bhttp\.(Get|Post|Head)\s*\(\s*"([^"]+)""#),
        family("go_http_request", Family::HttpFetch, &[Language::Go],
            r#"\bhttp\.NewRequest(?:WithContext)?\s*\((?:\s*ctx\s*,)?\s*(?:http\.Method(\w+)|"([A-Z]+)")\s*,\s*"([^"]+)""#),
        family("rust_reqwest", Family::HttpClient, &[Language::Rust],
            r#"\breqwest::(?:blocking::)?(get)\s*\(\s*"([^"]+)""#),
        // Processes
        family("js_child_process", Family::Process, JS,
            r#"\b(spawn|spawnSync|exec|execSync|execFile|execFileSync|fork)\s*\(\s*[`'"]([^`'"]+)[`'"](?:\s*,\s*\[\s*[`'"]([^`'"]+))?"#),
        family("python_subprocess", Family::Process, &[Language::Python],
            r#"\bsubprocess\.(run|call|check_call|check_output|Popen)\s*\(\s*\[?\s*f?["']([^"']+)["'](?:\s*,\s*f?["']([^"']+))?"#),
        family("python_os_system", Family::Process, &[Language::Python],
            r#"\bos\.(system|popen)\s*\(\s*f?["']([^"']+)"#),
        family("rust_command", Family::Process, &[Language::Rust],
            r#"\b(Command)::new\s*\(\s*"([^"]+)"\s*\)(?:\s*\.arg\s*\(\s*"([^"]+)")?"#),
        family("go_exec", Family::Process, &[Language::Go],
            r#"\bexec\.(Command(?:Context)?)\s*\(\s*(?:ctx\s*,\s*)?"([^"]+)"(?:\s*,\s*"([^"]+)")?"#),
        family("java_process", Family::Process, &[Language::Java],
            r#"\b(ProcessBuilder|exec)\s*\(\s*"([^"]+)"(?:\s*,\s*"([^"]+)")?"#),
        family("cpp_system", Family::Process, &[Language::Cpp],
            r#"\b(system|popen|execlp|execvp)\s*\(\s*"([^"]+)""#),
    ]
});

const SCRIPT_EXTENSIONS: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("ts", "typescript"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("rb", "ruby"),
    ("pl", "perl"),
    ("php", "php"),
    ("ps1", "powershell"),
    ("go", "go"),
];

/// Detect bridges on one line with the default confidences.
pub fn detect(line: &str, line_number: u32, source_language: Language, file_path: &str) -> Vec<BridgeCandidate> {
    detect_with(line, line_number, source_language, file_path, &BridgeConfidence::default())
}

/// Detect bridges on one line.
pub fn detect_with(
    line: &str,
    line_number: u32,
    source_language: Language,
    file_path: &str,
    confidence: &BridgeConfidence,
) -> Vec<BridgeCandidate> {
    if is_comment(line, source_language) {
        return Vec::new();
    }

    let mut out = Vec::new();
    for family in FAMILIES.iter() {
        if !family.languages.is_empty() && !family.languages.contains(&source_language) {
            continue;
        }
        for caps in family.regex.captures_iter(line) {
            let column = caps.get(0).map(|m| m.start() as u32).unwrap_or(0);
            let Some(mut candidate) = build_candidate(family, &caps, confidence) else {
                continue;
            };
            candidate.line = line_number;
            candidate.column = column;
            candidate.metadata.insert("family".to_string(), family.name.to_string());
            candidate.metadata.insert("source_language".to_string(), source_language.as_str().to_string());
            candidate.metadata.insert("file".to_string(), file_path.to_string());
            out.push(candidate);
        }
    }
    out
}

fn build_candidate(family: &PatternFamily, caps: &Captures<'_>, confidence: &BridgeConfidence) -> Option<BridgeCandidate> {
    let mut metadata = BTreeMap::new();
    let (kind, endpoint, score) = match family.family {
        Family::GrpcClient | Family::GrpcStub => {
            let service = caps.get(1)?.as_str().to_string();
            metadata.insert("service".to_string(), service.clone());
            let score = match family.family {
                Family::GrpcClient => confidence.grpc_client,
                _ => confidence.grpc_stub,
            };
            (BridgeKind::Grpc, service, score)
        }
        Family::HttpClient | Family::HttpFetch => {
            // The URL is always the last participating group.
            let url = (1..caps.len()).rev().find_map(|i| caps.get(i))?.as_str();
            let method = if caps.len() > 2 {
                (1..caps.len() - 1)
                    .find_map(|i| caps.get(i))
                    .map(|m| m.as_str().to_uppercase())
            } else {
                None
            };
            metadata.insert("method".to_string(), method.unwrap_or_else(|| "GET".to_string()));
            metadata.insert("url".to_string(), url.to_string());
            let score = match family.family {
                Family::HttpClient => confidence.http_client,
                _ => confidence.http_fetch,
            };
            (BridgeKind::Http, normalize_http_target(url), score)
        }
        Family::Process => {
            let api = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let command = caps.get(2)?.as_str();
            let mut tokens: Vec<&str> = command.split_whitespace().collect();
            if let Some(arg) = caps.get(3) {
                tokens.push(arg.as_str());
            }
            let program = tokens.first().copied().unwrap_or(command);
            metadata.insert("command".to_string(), program.to_string());
            metadata.insert("execution".to_string(), execution_mode(api).to_string());
            if tokens.len() > 1 {
                metadata.insert("data_transfer".to_string(), "command_line_args".to_string());
            }

            match tokens.iter().find_map(|t| script_language(t).map(|lang| (*t, lang))) {
                Some((script, lang)) => {
                    metadata.insert("target_language".to_string(), lang.to_string());
                    (BridgeKind::ScriptInvoke, script.trim_start_matches("./").to_string(), confidence.script_invoke)
                }
                None => {
                    let name = program.rsplit('/').next().unwrap_or(program).to_string();
                    (BridgeKind::Spawn, name, confidence.spawn)
                }
            }
        }
    };

    if endpoint.is_empty() {
        return None;
    }
    Some(BridgeCandidate {
        kind,
        target_endpoint: endpoint,
        confidence: score,
        line: 0,
        column: 0,
        metadata,
    })
}

fn execution_mode(api: &str) -> &'static str {
    match api {
        "system" | "popen" | "exec" | "execSync" => "shell",
        "spawnSync" | "execFileSync" | "run" | "call" | "check_call" | "check_output" => "sync",
        _ => "async",
    }
}

fn script_language(token: &str) -> Option<&'static str> {
    let token = token.trim_matches(|c| c == '"' || c == '\'');
    let (_, ext) = token.rsplit_once('.')?;
    SCRIPT_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
}

/// Reduce a URL or template to its route path: `${API}/users/${id}` -> `/users/${id}`.
pub fn normalize_http_target(url: &str) -> String {
    let mut rest = url.trim();
    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
        rest = rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
    }
    while rest.starts_with("${") {
        match rest.find('}') {
            Some(end) => rest = &rest[end + 1..],
            None => break,
        }
    }
    let path = rest.split(['?', '#']).next().unwrap_or(rest);
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

pub(crate) fn is_comment(line: &str, language: Language) -> bool {
    let trimmed = line.trim_start();
    match language {
        Language::Python => trimmed.starts_with('#'),
        _ => {
            // Block comment continuation lines are `* text` or `*/`; a
            // leading `*resp = ...` is a dereference.
            let continuation = trimmed
                .strip_prefix('*')
                .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t', '/']));
            trimmed.starts_with("//") || trimmed.starts_with("/*") || continuation
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_grpc_client() {
        let found = detect(
            "cl := pb.NewProductCatalogServiceClient(cs.productCatalogSvcConn)",
            42,
            Language::Go,
            "src/frontend/rpc.go",
        );

        assert_eq!(found.len(), 1);
        let candidate = &found[0];
        assert_eq!(candidate.kind, BridgeKind::Grpc);
        assert_eq!(candidate.target_endpoint, "ProductCatalog");
        assert!((0.6..=1.0).contains(&candidate.confidence));
        assert_eq!(candidate.line, 42);
    }

    #[test]
    fn test_plain_arithmetic_has_no_bridges() {
        assert!(detect("x := 1 + 2", 1, Language::Go, "main.go").is_empty());
    }

    #[test]
    fn test_python_stub_and_requests() {
        let stub = detect("stub = demo_pb2_grpc.CartServiceStub(channel)", 3, Language::Python, "cart.py");
        assert_eq!(stub.len(), 1);
        assert_eq!(stub[0].target_endpoint, "Cart");

        let http = detect("resp = requests.post(\"https://api.local/v1/orders?x=1\", json=o)", 9, Language::Python, "c.py");
        assert_eq!(http.len(), 1);
        assert_eq!(http[0].kind, BridgeKind::Http);
        assert_eq!(http[0].target_endpoint, "/v1/orders");
        assert_eq!(http[0].metadata["method"], "POST");
    }

    #[test]
    fn test_script_invocation_vs_spawn() {
        let script = detect(
            "subprocess.run([\"python\", \"scripts/train.py\"], check=True)",
            1,
            Language::Python,
            "ops/run.py",
        );
        assert_eq!(script.len(), 1);
        assert_eq!(script[0].kind, BridgeKind::ScriptInvoke);
        assert_eq!(script[0].target_endpoint, "scripts/train.py");
        assert_eq!(script[0].metadata["target_language"], "python");

        let spawn = detect("let out = Command::new(\"git\").arg(\"status\")", 1, Language::Rust, "src/vcs.rs");
        assert_eq!(spawn.len(), 1);
        assert_eq!(spawn[0].kind, BridgeKind::Spawn);
        assert_eq!(spawn[0].target_endpoint, "git");
    }

    #[test]
    fn test_families_are_language_scoped() {
        // Go constructor syntax means nothing in Python.
        assert!(detect("NewProductCatalogServiceClient(conn)", 1, Language::Python, "a.py").is_empty());
        assert!(detect("// fetch('/api/users')", 1, Language::JavaScript, "a.js").is_empty());
        let js = detect("const r = await fetch(`${API}/api/users`)", 1, Language::JavaScript, "a.js");
        assert_eq!(js[0].target_endpoint, "/api/users");
    }

    #[test]
    fn test_dereference_is_not_a_comment() {
        assert!(is_comment(" * calls fetch('/api/users')", Language::JavaScript));
        assert!(is_comment("*/", Language::Go));
        assert!(!is_comment("*resp, err = http.Get(\"http://inventory/v1/items\")", Language::Go));

        let found = detect("\t*resp, err = http.Get(\"http://inventory/v1/items\")", 7, Language::Go, "svc/client.go");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, BridgeKind::Http);
        assert_eq!(found[0].target_endpoint, "/v1/items");
    }

    #[test]
    fn test_custom_confidence() {
        let tuned = BridgeConfidence {
            grpc_client: 0.65,
            ..BridgeConfidence::default()
        };
        let found = detect_with("c := pb.NewCartServiceClient(conn)", 1, Language::Go, "a.go", &tuned);
        assert_eq!(found[0].confidence, 0.65);
    }
}
