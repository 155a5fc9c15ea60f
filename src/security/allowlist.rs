//! Read-only command allowlist.
//!
//! An ordered table of anchored signatures for commands that cannot mutate
//! filesystem or network state. A sub-command is read-only iff some
//! signature matches it; the first match wins. Anything unmatched is
//! assumed to mutate.
//!
//! Every signature's argument grammar rejects shell metacharacters
//! (`<`, `>`, `|`, `;`, `&`, `$`, backtick, parentheses, braces, newlines),
//! so a signature can never match text that smuggles in a second command.
//! Some commands also carry a list of flags that turn them into writers
//! (`find -delete`, `sort -o`), checked after the regex matches.

use std::sync::LazyLock;

use regex::Regex;

/// One argument: quoted and unquoted pieces glued together.
const ARG: &str = r#"(?:'[^'\n\r]*'|"[^"$`\\\n\r]*"|[^\s'"<>()$`|{}&;\\]+)+"#;

/// Shorthand for a whole-line signature of `head` followed by free arguments.
fn any_args(head: &str) -> String {
    format!(r"^{head}(?:[ \t]+{ARG})*[ \t]*$")
}

fn no_args(head: &str) -> String {
    format!(r"^{head}[ \t]*$")
}

/// `head` followed only by flags drawn from the `flags` alternation.
fn only_flags(head: &str, flags: &str) -> String {
    format!(r"^{head}(?:[ \t]+(?:{flags}))*[ \t]*$")
}

/// Tools whose `--help` only prints usage. Interpreters and package runners
/// are left out: their next word names a script or package to run.
const HELP_TOOLS: &str = "git|cargo|npm|yarn|pnpm|rustc|rustup|gem|docker|kubectl|make|gcc|clang|cmake|go|java|ls|grep|rg|find|sed|awk|tar";

/// Long options and words that make an otherwise read-only git command write.
const GIT_WRITERS: &[&str] = &["--output", "--ext-diff", "--open-files-in-pager"];

struct SignatureSpec {
    name: &'static str,
    pattern: String,
    forbidden_words: &'static [&'static str],
    forbidden_short: &'static [char],
}

impl SignatureSpec {
    fn new(name: &'static str, pattern: String) -> Self {
        Self {
            name,
            pattern,
            forbidden_words: &[],
            forbidden_short: &[],
        }
    }

    fn forbid(mut self, words: &'static [&'static str]) -> Self {
        self.forbidden_words = words;
        self
    }

    fn forbid_short(mut self, flags: &'static [char]) -> Self {
        self.forbidden_short = flags;
        self
    }
}

/// A compiled read-only signature.
pub struct Signature {
    pub name: &'static str,
    pattern: Regex,
    forbidden_words: &'static [&'static str],
    forbidden_short: &'static [char],
}

impl Signature {
    pub fn is_match(&self, command: &str) -> bool {
        self.pattern.is_match(command) && !self.has_forbidden_flag(command)
    }

    fn has_forbidden_flag(&self, command: &str) -> bool {
        command.split_whitespace().any(|raw| {
            // The shell strips quotes before the program sees them.
            let word = raw.replace(['\'', '"'], "");
            let forbidden_word = self.forbidden_words.iter().any(|f| {
                word == *f
                    || word
                        .strip_prefix(*f)
                        .is_some_and(|rest| rest.starts_with('='))
            });
            let forbidden_cluster = word.starts_with('-')
                && !word.starts_with("--")
                && word[1..].chars().any(|c| self.forbidden_short.contains(&c));
            forbidden_word || forbidden_cluster
        })
    }
}

fn signature_specs() -> Vec<SignatureSpec> {
    use SignatureSpec as S;

    vec![
        // ---------------------------------------------------------------
        // File inspection
        // ---------------------------------------------------------------
        S::new("cat", any_args("cat")),
        S::new("head", any_args("head")),
        S::new("tail", any_args("tail")),
        S::new("wc", any_args("wc")),
        S::new("stat", any_args("stat")),
        S::new("file", any_args("file")).forbid_short(&['C']),
        S::new("nl", any_args("nl")),
        S::new("cut", any_args("cut")),
        S::new("paste", any_args("paste")),
        S::new("tr", any_args("tr")),
        S::new("column", any_args("column")),
        S::new("fold", any_args("fold")),
        S::new("expand", any_args("expand")),
        S::new("rev", any_args("rev")),
        S::new("tac", any_args("tac")),
        S::new("sort", any_args("sort"))
            .forbid(&["--output", "--compress-program"])
            .forbid_short(&['o']),
        // uniq's second operand is an output file
        S::new(
            "uniq",
            format!(r"^uniq(?:[ \t]+-[A-Za-z-]+)*(?:[ \t]+{ARG})?[ \t]*$"),
        ),
        S::new("strings", any_args("strings")),
        S::new("hexdump", any_args("hexdump")),
        S::new("od", any_args("od")),
        S::new("checksum", any_args(r"(?:md5sum|sha1sum|sha256sum|sha512sum|cksum)")),
        S::new("base64", any_args("base64"))
            .forbid(&["--output"])
            .forbid_short(&['o']),
        S::new("basename", any_args("basename")),
        S::new("dirname", any_args("dirname")),
        S::new("realpath", any_args("realpath")),
        S::new("readlink", any_args("readlink")),
        S::new("ls", any_args("ls")),
        S::new("tree", any_args("tree")).forbid_short(&['o']),
        S::new("du", any_args("du")),
        S::new("df", any_args("df")),
        S::new("diff", any_args("diff")),
        S::new("cmp", any_args("cmp")),
        S::new("comm", any_args("comm")),
        S::new("find", any_args("find")).forbid(&[
            "-exec", "-execdir", "-ok", "-okdir", "-delete", "-fls", "-fprint", "-fprint0",
            "-fprintf",
        ]),
        S::new("fd", any_args("fd"))
            .forbid(&["--exec", "--exec-batch"])
            .forbid_short(&['x', 'X']),
        // ---------------------------------------------------------------
        // Search and filtering
        // ---------------------------------------------------------------
        S::new("grep", any_args("(?:grep|egrep|fgrep)")),
        S::new("rg", any_args("rg")).forbid(&["--pre"]),
        S::new("jq", any_args("jq")),
        // ---------------------------------------------------------------
        // Output and shell builtins without side effects
        // ---------------------------------------------------------------
        S::new("echo", any_args("echo")),
        S::new("printf", any_args("printf")),
        S::new("seq", any_args("seq")),
        S::new("true", no_args("true")),
        S::new("false", no_args("false")),
        S::new("test", any_args(r"(?:test|\[)")),
        S::new("sleep", any_args("sleep")),
        S::new("which", any_args("which")),
        S::new("type", any_args("type")),
        S::new("whereis", any_args("whereis")),
        S::new("command -v", any_args("command[ \t]+-[vV]")),
        // ---------------------------------------------------------------
        // Process and system introspection
        // ---------------------------------------------------------------
        S::new("pwd", no_args("pwd")),
        S::new("whoami", no_args("whoami")),
        S::new("id", any_args("id")),
        S::new("groups", any_args("groups")),
        S::new("hostname", no_args("hostname")),
        S::new("uname", any_args("uname")),
        S::new("uptime", no_args("uptime")),
        S::new("nproc", no_args("nproc")),
        S::new("free", any_args("free")),
        S::new("lscpu", no_args("lscpu")),
        S::new("arch", no_args("arch")),
        S::new("locale", no_args("locale")),
        S::new("printenv", any_args("printenv")),
        S::new("env", no_args("env")),
        S::new("tty", no_args("tty")),
        S::new("date", any_args("date"))
            .forbid(&["--set"])
            .forbid_short(&['s']),
        S::new("ps", any_args("ps")),
        S::new("pgrep", any_args("pgrep")),
        S::new("lsof", any_args("lsof")),
        // ---------------------------------------------------------------
        // Version control, read operations only
        // ---------------------------------------------------------------
        S::new("git status", any_args("git status")).forbid(GIT_WRITERS),
        S::new("git diff", any_args("git diff")).forbid(GIT_WRITERS),
        S::new("git log", any_args("git log")).forbid(GIT_WRITERS),
        S::new("git show", any_args("git show")).forbid(GIT_WRITERS),
        S::new("git blame", any_args("git blame")).forbid(GIT_WRITERS),
        S::new("git grep", any_args("git grep"))
            .forbid(GIT_WRITERS)
            .forbid_short(&['O']),
        S::new("git rev-parse", any_args("git rev-parse")),
        S::new("git ls-files", any_args("git ls-files")),
        S::new("git ls-tree", any_args("git ls-tree")),
        S::new("git cat-file", any_args("git cat-file")),
        S::new("git describe", any_args("git describe")),
        S::new("git shortlog", any_args("git shortlog")).forbid(GIT_WRITERS),
        S::new(
            "git branch",
            only_flags(
                "git branch",
                r"-a|-r|-v|-vv|-l|--all|--remotes|--verbose|--list|--show-current|--merged|--no-merged|--contains|--no-contains|--sort=[\w:.-]+|--color|--no-color",
            ),
        ),
        S::new(
            "git tag",
            only_flags(
                "git tag",
                r"-l|--list|-n[0-9]*|--sort=[\w:.-]+|--merged|--no-merged|--contains",
            ),
        ),
        S::new("git remote", only_flags("git remote", r"-v|--verbose")),
        S::new(
            "git remote show",
            r"^git remote[ \t]+(?:show|get-url)[ \t]+[\w.-]+[ \t]*$".to_string(),
        ),
        S::new(
            "git config get",
            r"^git config(?:[ \t]+--(?:global|local|system))?[ \t]+(?:--get|--get-all|--get-regexp|-l|--list)(?:[ \t]+[\w.-]+)?[ \t]*$"
                .to_string(),
        ),
        S::new("git reflog", any_args(r"git reflog(?:[ \t]+show)?"))
            .forbid(&["expire", "delete"]),
        S::new("git stash list", any_args(r"git stash[ \t]+(?:list|show)")).forbid(GIT_WRITERS),
        S::new("git worktree list", only_flags(r"git worktree[ \t]+list", r"-v|--porcelain")),
        // ---------------------------------------------------------------
        // Tool versions, help and package listings
        // ---------------------------------------------------------------
        S::new(
            "version",
            r"^(?:git|node|npm|npx|yarn|pnpm|deno|bun|cargo|rustc|rustup|ruby|gem|docker|make|gcc|clang|cmake|go|java)[ \t]+--version[ \t]*$".to_string(),
        ),
        S::new(
            "version",
            r"^(?:node|npm|yarn|pnpm|bun|gcc|clang|make)[ \t]+-v[ \t]*$".to_string(),
        ),
        S::new("version", r"^(?:cargo|rustc|rustup)[ \t]+-V[ \t]*$".to_string()),
        S::new("version", r"^java[ \t]+-version[ \t]*$".to_string()),
        // Only tools whose `version` subcommand just prints
        S::new("version", r"^(?:go|docker|cargo|rustup)[ \t]+version[ \t]*$".to_string()),
        S::new(
            "python version",
            r"^(?:python|python3|pip|pip3)[ \t]+(?:--version|-V)[ \t]*$".to_string(),
        ),
        S::new(
            "help",
            format!(r"^(?:{HELP_TOOLS})[ \t]+--help[ \t]*$"),
        ),
        S::new(
            "help",
            r"^(?:git|cargo|docker|kubectl|rustup|go|npm|pip|pip3)[ \t]+[a-z][a-z0-9-]*[ \t]+--help[ \t]*$".to_string(),
        ),
        S::new("npm ls", any_args(r"npm[ \t]+(?:ls|list|view|outdated)")),
        S::new("pip list", any_args(r"pip3?[ \t]+(?:list|show|freeze)")),
        S::new("docker ps", any_args(r"docker[ \t]+(?:ps|images)")),
    ]
}

static SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    signature_specs()
        .into_iter()
        .filter_map(|spec| match Regex::new(&spec.pattern) {
            Ok(pattern) => Some(Signature {
                name: spec.name,
                pattern,
                forbidden_words: spec.forbidden_words,
                forbidden_short: spec.forbidden_short,
            }),
            Err(e) => {
                // Dropping a signature only makes classification stricter.
                tracing::error!("Invalid read-only signature {}: {}", spec.name, e);
                None
            }
        })
        .collect()
});

/// The compiled signature table, in evaluation order.
pub fn signatures() -> &'static [Signature] {
    &SIGNATURES
}

/// Name of the first signature matching `sub_command`, if any.
pub fn matching_signature(sub_command: &str) -> Option<&'static str> {
    let trimmed = sub_command.trim();
    if trimmed.is_empty() {
        return None;
    }
    signatures()
        .iter()
        .find(|sig| sig.is_match(trimmed))
        .map(|sig| sig.name)
}

/// True when `sub_command` matches a read-only signature.
pub fn is_read_only(sub_command: &str) -> bool {
    matching_signature(sub_command).is_some()
}
