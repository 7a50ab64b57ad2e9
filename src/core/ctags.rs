// src/core/ctags.rs

//! Symbol locations from `ctags` output.

use crate::core::config::ProjectConfig;
use crate::core::project_build::ProjectBuild;
use crate::system::shell::escape_argument;
use crate::system::terminal::Terminal;
use std::path::{Path, PathBuf};

/// Tag lines longer than this are generated code and skipped by searches.
const MAX_TAG_LINE_LENGTH: usize = 2048;

/// Where a tag points to. `line` and `index` are zero-based.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub file_path: PathBuf,
    pub line: usize,
    pub index: usize,
    pub symbol: String,
    pub scope: String,
    pub source: String,
    pub kind: String,
}

impl Location {
    /// Whether the line parsed into a location at all.
    pub fn is_valid(&self) -> bool {
        !self.file_path.as_os_str().is_empty()
    }
}

/// The tags of a file or of a whole project, as printed by `ctags -f -`.
#[derive(Debug, Clone)]
pub struct Ctags {
    /// The directory tag file paths are relative to.
    pub project_path: PathBuf,
    output: String,
    enable_scope: bool,
    enable_kind: bool,
}

impl Ctags {
    /// Runs the configured ctags over `path`.
    ///
    /// A directory is scanned recursively from its project root, skipping build and
    /// dependency folders; a file is scanned on its own. Errors printed by ctags go
    /// to the terminal.
    pub fn new(
        terminal: &Terminal,
        config: &ProjectConfig,
        path: &Path,
        enable_scope: bool,
        enable_kind: bool,
        languages: &str,
    ) -> Self {
        let mut command = format!(
            "{} --sort=foldcase -I \"override noexcept\" -f -",
            config.ctags_command
        );
        if !languages.is_empty() {
            command.push_str(&format!(" --languages={}", languages));
        }
        command.push_str(" --fields=n");
        if enable_scope {
            command.push('s');
        }
        if enable_kind {
            command.push('K');
        }

        let project_path = if path.is_dir() {
            for folder in ProjectBuild::get_exclude_folders(config) {
                command.push_str(&format!(" --exclude=\"{0}/*\" --exclude=\"*/{0}/*\"", folder));
            }
            command.push_str(" -R *");
            ProjectBuild::create(path, config)
                .map(|build| build.project_path)
                .unwrap_or_else(|| path.to_path_buf())
        } else {
            command.push_str(" --c-kinds=+p --c++-kinds=+p ");
            command.push_str(&escape_argument(&path.to_string_lossy()));
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        };

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status =
            terminal.process_with_streams(&[], &mut stdout, &command, &project_path, Some(&mut stderr));
        if !stderr.is_empty() {
            terminal.print_bold(&String::from_utf8_lossy(&stderr));
        }
        log::debug!("ctags exited with {} for '{}'", status, path.display());

        Self::from_output(project_path, String::from_utf8_lossy(&stdout).into_owned(), enable_scope, enable_kind)
    }

    /// Wraps tags produced elsewhere, e.g. read from a `tags` file.
    pub fn from_output(project_path: PathBuf, output: String, enable_scope: bool, enable_kind: bool) -> Self {
        Self {
            project_path,
            output,
            enable_scope,
            enable_kind,
        }
    }

    /// Whether ctags produced no tags at all.
    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }

    /// The raw tag lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }

    /// Parses one tag line such as
    /// `main\tmain.cpp\t/^int main() {$/;"\tline:1`.
    ///
    /// With `add_markup` the source is escaped for Pango markup and every
    /// occurrence of the symbol is wrapped in `<b>`; `index` then counts an entity
    /// as one character. An unparseable line yields a partially filled location.
    pub fn get_location(&self, line: &str, add_markup: bool, symbol_ends_with_open_parenthesis: bool) -> Location {
        let mut location = Location::default();
        let line = line.strip_suffix('\r').unwrap_or(line);

        let Some((symbol, rest)) = line.split_once('\t') else {
            return location;
        };
        location.symbol = normalize_operator(symbol);

        let Some((file_path, rest)) = rest.split_once('\t') else {
            return location;
        };
        location.file_path = PathBuf::from(file_path);

        // Skip the `/^` that opens the search pattern.
        let Some(pattern) = rest.get(2..).filter(|pattern| !pattern.is_empty()) else {
            return location;
        };
        let source = pattern.trim_start_matches([' ', '\t']);
        let leading_whitespace = pattern.len() - source.len();

        let Some((source, fields)) = source.split_once("/;\"\t") else {
            return location;
        };
        location.source = unescape_source(source.strip_suffix('$').unwrap_or(source));

        let line_field = if self.enable_kind {
            let Some((kind, rest)) = fields.split_once('\t') else {
                return location;
            };
            location.kind = kind.to_string();
            rest
        } else {
            fields
        };
        let Some(line_field) = line_field.strip_prefix("line:") else {
            return location;
        };
        let (number, scope_field) = match line_field.split_once('\t') {
            Some((number, scope_field)) => (number, Some(scope_field)),
            None => (line_field, None),
        };
        location.line = number.trim().parse::<usize>().map_or(0, |n| n.saturating_sub(1));

        if self.enable_scope {
            if let Some((_, scope)) = scope_field.and_then(|field| field.split_once(':')) {
                location.scope = scope.to_string();
            }
        }

        if location.symbol.is_empty() {
            return location;
        }
        let mut index = leading_whitespace;
        if add_markup {
            location.source = highlight_symbol(
                &location.source,
                &location.symbol,
                symbol_ends_with_open_parenthesis,
                &mut index,
            );
        } else if let Some(position) = location.source.find(location.symbol.as_str()) {
            index += location.source.get(..position).map_or(0, |before| before.chars().count());
        }
        location.index = index;
        location
    }

    /// Locations of `name` (optionally `Scope::name`) whose declaration best matches
    /// the type signature `type_signature`.
    pub fn find_locations(&self, name: &str, type_signature: &str) -> Vec<Location> {
        let parts = get_type_parts(&insert_name(type_signature, name));

        let mut best_score = i64::MIN;
        let mut best_locations = Vec::new();
        for line in self.lines() {
            if line.len() > MAX_TAG_LINE_LENGTH {
                continue;
            }
            let mut location = self.get_location(line, false, false);
            let qualified = if location.scope.is_empty() {
                location.symbol.clone()
            } else {
                format!("{}::{}", location.scope, location.symbol)
            };
            if qualified != name {
                continue;
            }
            location.file_path = self.project_path.join(&location.file_path);

            let source_parts = get_type_parts(&location.source);
            let score = ordered_match_score(&parts, &source_parts) + ordered_match_score(&source_parts, &parts);
            if score > best_score {
                best_score = score;
                best_locations.clear();
                best_locations.push(location);
            } else if score == best_score {
                best_locations.push(location);
            }
        }
        best_locations
    }
}

/// Runs ctags over `path` and returns the best matches for `name` and its type.
pub fn get_locations(
    terminal: &Terminal,
    config: &ProjectConfig,
    path: &Path,
    name: &str,
    type_signature: &str,
    languages: &str,
) -> Vec<Location> {
    let ctags = Ctags::new(terminal, config, path, true, false, languages);
    if ctags.is_empty() {
        return Vec::new();
    }
    ctags.find_locations(name, type_signature)
}

/// Splits a type into identifiers plus `*` and `&`, stopping at a body `{`.
pub fn get_type_parts(type_signature: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in type_signature.chars() {
        if is_identifier_char(c) || c == '~' {
            current.push(c);
            continue;
        }
        if !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        match c {
            '*' | '&' => parts.push(c.to_string()),
            '{' => return parts,
            _ => {}
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Puts `name` in front of the top-level parameter list of `type_signature`.
fn insert_name(type_signature: &str, name: &str) -> String {
    let mut depth = 0i64;
    let mut position = type_signature.len();
    for (i, c) in type_signature.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            '(' if depth == 0 => {
                position = i;
                break;
            }
            _ => {}
        }
    }
    let mut full = type_signature.to_string();
    full.insert_str(position, name);
    full
}

/// `+1` for every part of `wanted` found in order in `available`, `-1` otherwise.
fn ordered_match_score(wanted: &[String], available: &[String]) -> i64 {
    let mut score = 0;
    let mut start = 0;
    for part in wanted {
        let found = available
            .get(start..)
            .and_then(|rest| rest.iter().position(|candidate| candidate == part));
        match found {
            Some(offset) => {
                start += offset + 1;
                score += 1;
            }
            None => score -= 1,
        }
    }
    score
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

/// `operator ()` is tagged with a space that the source does not have.
fn normalize_operator(symbol: &str) -> String {
    match symbol.strip_prefix("operator ") {
        Some(rest) if rest.chars().next().is_some_and(|c| !is_identifier_char(c)) => {
            format!("operator{}", rest)
        }
        _ => symbol.to_string(),
    }
}

fn unescape_source(source: &str) -> String {
    let mut unescaped = String::with_capacity(source.len());
    let mut escaped = false;
    for c in source.chars() {
        if !escaped && c == '\\' {
            escaped = true;
            continue;
        }
        escaped = false;
        unescaped.push(c);
    }
    unescaped
}

fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&#39;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escapes `source` and bolds each occurrence of `symbol`. `index` is advanced by
/// the characters before the first occurrence.
fn highlight_symbol(source: &str, symbol: &str, ends_with_open_parenthesis: bool, index: &mut usize) -> String {
    let source = escape_markup(source);
    let symbol = escape_markup(symbol);
    let mut pattern = symbol.clone();
    if ends_with_open_parenthesis {
        pattern.push('(');
    }

    let mut highlighted = String::with_capacity(source.len() + 7);
    let mut first = true;
    let mut rest = source.as_str();
    while let Some(c) = rest.chars().next() {
        if rest.starts_with(pattern.as_str()) {
            highlighted.push_str("<b>");
            highlighted.push_str(&symbol);
            highlighted.push_str("</b>");
            rest = rest.get(symbol.len()..).unwrap_or_default();
            first = false;
            continue;
        }
        let consumed = if c == '&' {
            rest.find(';').map_or(rest.len(), |end| end + 1)
        } else {
            c.len_utf8()
        };
        highlighted.push_str(rest.get(..consumed).unwrap_or_default());
        rest = rest.get(consumed..).unwrap_or_default();
        if first {
            *index += 1;
        }
    }
    highlighted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(output: &str, enable_scope: bool, enable_kind: bool) -> Ctags {
        Ctags::from_output(PathBuf::from("/project"), output.to_string(), enable_scope, enable_kind)
    }

    #[test]
    fn test_get_location_of_plain_tag() {
        // --- Setup ---
        let ctags = tags("", false, false);

        // --- Execute ---
        let location = ctags.get_location("main\tmain.cpp\t/^int main() { return 0; }$/;\"\tline:1", false, false);

        // --- Assert ---
        assert_eq!(
            location,
            Location {
                file_path: PathBuf::from("main.cpp"),
                line: 0,
                index: 4,
                symbol: "main".to_string(),
                scope: String::new(),
                source: "int main() { return 0; }".to_string(),
                kind: String::new(),
            }
        );
    }

    #[test]
    fn test_get_location_with_scope_and_indentation() {
        let ctags = tags("", true, false);

        let location = ctags.get_location(
            "print\tfoo.hpp\t/^  void print() const;$/;\"\tline:12\tclass:ns::Foo",
            false,
            false,
        );

        assert_eq!(location.line, 11);
        assert_eq!(location.index, 7);
        assert_eq!(location.scope, "ns::Foo");
        assert_eq!(location.source, "void print() const;");
    }

    #[test]
    fn test_get_location_with_kind() {
        let ctags = tags("", false, true);

        let location = ctags.get_location("main\tmain.cpp\t/^int main() {$/;\"\tfunction\tline:3", false, false);

        assert_eq!(location.kind, "function");
        assert_eq!(location.line, 2);
        assert_eq!(location.index, 4);
    }

    #[test]
    fn test_get_location_operator_and_escapes() {
        let ctags = tags("", false, false);

        let location = ctags.get_location(
            "operator ()\tfoo.hpp\t/^  bool operator()(const char \\/ c) const;$/;\"\tline:4",
            false,
            false,
        );

        assert_eq!(location.symbol, "operator()");
        assert_eq!(location.source, "bool operator()(const char / c) const;");
        assert_eq!(location.index, 7);
        assert_eq!(normalize_operator("operator new"), "operator new");
    }

    #[test]
    fn test_get_location_with_markup() {
        let ctags = tags("", false, false);

        let location = ctags.get_location("items\ta.cpp\t/^std::vector<int> items;$/;\"\tline:2", true, false);

        assert_eq!(location.source, "std::vector&lt;int&gt; <b>items</b>;");
        assert_eq!(location.index, 17);

        let call = ctags.get_location("f\ta.cpp\t/^int f(int fa) { return fa; }$/;\"\tline:1", true, true);
        assert_eq!(call.source, "int <b>f</b>(int fa) { return fa; }");
        assert_eq!(call.index, 4);
    }

    #[test]
    fn test_get_location_of_malformed_line() {
        let ctags = tags("", false, false);

        assert!(!ctags.get_location("no tabs here", false, false).is_valid());
        let partial = ctags.get_location("main\tmain.cpp", false, false);
        assert_eq!(partial.symbol, "main");
        assert!(!partial.is_valid());
    }

    #[test]
    fn test_get_type_parts() {
        assert_eq!(
            get_type_parts("const std::vector<int> &foo(int *a) { return {}; }"),
            vec!["const", "std", "vector", "int", "&", "foo", "int", "*", "a"]
        );
        assert_eq!(get_type_parts("Foo::~Foo()"), vec!["Foo", "~Foo"]);
    }

    #[test]
    fn test_insert_name_skips_template_parentheses() {
        assert_eq!(insert_name("void (int)", "run"), "void run(int)");
        assert_eq!(insert_name("std::function<void(int)> ()", "make"), "std::function<void(int)> make()");
    }

    #[test]
    fn test_find_locations_prefers_best_type_match() {
        // --- Setup ---
        let ctags = tags(
            concat!(
                "print\ta.cpp\t/^  void print(int x);$/;\"\tline:3\tclass:Foo\n",
                "print\tb.cpp\t/^  void print(double x);$/;\"\tline:8\tclass:Foo\n",
                "print\tc.cpp\t/^void print(int);$/;\"\tline:1\n",
            ),
            true,
            false,
        );

        // --- Execute ---
        let locations = ctags.find_locations("Foo::print", "void (int)");

        // --- Assert ---
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].file_path, PathBuf::from("/project/a.cpp"));
        assert_eq!(locations[0].line, 2);
        assert!(ctags.find_locations("missing", "void ()").is_empty());
    }
}
