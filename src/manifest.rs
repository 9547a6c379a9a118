//! Manifest model and loader.
//!
//! Parses `cppan.yml` documents into a typed [`Config`]: a list of
//! [`Project`]s plus global options, feature-probe sets, and registry
//! settings. Configs layer system → user → project; later documents win on
//! scalars and union on sets.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::path::ProjectPath;
use crate::version::Version;
use crate::yaml::{
    get_map, get_scalar, get_string_seq, get_string_set, key_present, key_string, scalar_str,
    shape_of, string_seq, Shape,
};

pub const CPPAN_FILENAME: &str = "cppan.yml";
/// Local cache root and emission destination, relative to the project dir.
pub const LOCAL_DIR: &str = "cppan";
pub const DEFAULT_HOST: &str = "https://cppan.org";

// ─── Flags ─────────────────────────────────────────────────────────

/// Per-package flag bitset, shared with the registry wire protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProjectFlags(u64);

impl ProjectFlags {
    pub const HEADER_ONLY: ProjectFlags = ProjectFlags(1 << 0);
    pub const EXECUTABLE: ProjectFlags = ProjectFlags(1 << 1);
    pub const PRIVATE: ProjectFlags = ProjectFlags(1 << 2);
    pub const DIRECT: ProjectFlags = ProjectFlags(1 << 3);

    pub fn from_bits(bits: u64) -> Self {
        ProjectFlags(bits)
    }

    pub fn contains(self, flag: ProjectFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn insert(&mut self, flag: ProjectFlags) {
        self.0 |= flag.0;
    }
}

// ─── Cache roots ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PackagesDirType {
    Local,
    #[default]
    User,
    System,
}

impl PackagesDirType {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(PackagesDirType::Local),
            "user" => Ok(PackagesDirType::User),
            "system" => Ok(PackagesDirType::System),
            other => Err(Error::Manifest(format!(
                "unknown 'packages_dir' value '{}' (expected local, user, or system)",
                other
            ))),
        }
    }
}

// ─── Dependencies ──────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct Dependency {
    pub package: ProjectPath,
    pub version: Version,
    pub flags: ProjectFlags,
    pub md5: String,
    /// Cached version directory, filled during resolution.
    pub package_dir: PathBuf,
    /// Per-dependency cache root override; the config default applies
    /// when absent.
    pub package_dir_type: Option<PackagesDirType>,
    pub patches: Vec<String>,
    /// Adjacency from the registry response, keyed by package path.
    pub dependencies: BTreeMap<String, Dependency>,
}

impl Dependency {
    pub fn package_dir_type(&self, default: PackagesDirType) -> PackagesDirType {
        self.package_dir_type.unwrap_or(default)
    }
}

pub type Dependencies = BTreeMap<String, Dependency>;

/// Target and variable names derived from a resolved dependency.
#[derive(Clone, Debug)]
pub struct PackageInfo {
    pub dependency: Dependency,
    pub target_name: String,
    pub variable_name: String,
}

impl PackageInfo {
    pub fn new(d: &Dependency) -> Self {
        let v = d.version.to_any_version();
        let target_name = if v == "*" {
            d.package.to_string()
        } else {
            format!("{}-{}", d.package, v)
        };
        let variable_name = target_name.replace('.', "_");
        PackageInfo {
            dependency: d.clone(),
            target_name,
            variable_name,
        }
    }
}

// ─── Build-system insertions ───────────────────────────────────────

/// Verbatim text fragments spliced into generated build files.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InsertionBlock {
    pub pre_sources: String,
    pub post_sources: String,
    pub post_target: String,
    pub post_alias: String,
}

impl InsertionBlock {
    fn read_one(node: &Value, key: &str, dst: &mut String) -> Result<()> {
        if let Some(mut s) = get_scalar(node, key)? {
            // YAML block scalars carry a trailing newline.
            if s.ends_with('\n') {
                s.pop();
            }
            *dst = s;
        }
        Ok(())
    }

    pub fn load(&mut self, node: &Value) -> Result<()> {
        Self::read_one(node, "pre_sources", &mut self.pre_sources)?;
        Self::read_one(node, "post_sources", &mut self.post_sources)?;
        Self::read_one(node, "post_target", &mut self.post_target)?;
        Self::read_one(node, "post_alias", &mut self.post_alias)?;
        Ok(())
    }
}

// ─── Options ───────────────────────────────────────────────────────

pub const OPTION_LEVELS: [&str; 3] = ["any", "static", "shared"];

#[derive(Clone, Debug, Default)]
pub struct Options {
    /// (visibility, definition) pairs; visibility is public, private, or
    /// interface.
    pub definitions: BTreeSet<(String, String)>,
    pub include_directories: BTreeSet<String>,
    pub link_directories: BTreeSet<String>,
    pub link_libraries: BTreeSet<String>,
    pub global_definitions: BTreeSet<String>,
    pub bs_insertions: InsertionBlock,
}

#[derive(Clone, Debug, Default)]
pub struct IncludeDirectories {
    pub public: BTreeSet<PathBuf>,
    pub private: BTreeSet<PathBuf>,
}

impl IncludeDirectories {
    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.private.is_empty()
    }
}

// ─── Project ───────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct Project {
    pub package: ProjectPath,
    pub cppan_filename: String,
    pub license: String,
    pub empty: bool,
    pub shared_only: bool,
    pub static_only: bool,
    pub root_directory: PathBuf,
    /// Unmatched source patterns, compiled to regexes during discovery.
    pub sources: BTreeSet<String>,
    pub build_files: BTreeSet<String>,
    /// Resolved file set, relative to `root_directory`.
    pub files: BTreeSet<PathBuf>,
    pub exclude_from_build: BTreeSet<PathBuf>,
    pub include_directories: IncludeDirectories,
    pub header_only: bool,
    pub dependencies: Dependencies,
    pub options: BTreeMap<String, Options>,
    pub bs_insertions: InsertionBlock,
}

// ─── Config ────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Proxy {
    pub host: String,
    pub user: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub storage_dir: PathBuf,
    pub root_project: ProjectPath,
    pub packages_dir_type: PackagesDirType,
    pub proxy: Proxy,

    pub check_functions: BTreeSet<String>,
    pub check_includes: BTreeSet<String>,
    pub check_types: BTreeSet<String>,
    pub check_libraries: BTreeSet<String>,
    pub check_symbols: BTreeMap<String, BTreeSet<String>>,

    pub bs_insertions: InsertionBlock,
    pub projects: Vec<Project>,

    /// Direct dependencies, resolved and pinned.
    pub packages: BTreeMap<String, PackageInfo>,
    pub indirect_dependencies: Dependencies,
    /// Global definitions accumulated across per-package emission, keyed
    /// by option level.
    pub global_options: BTreeMap<String, Options>,
}

impl Default for Config {
    fn default() -> Self {
        let mut check_types = BTreeSet::new();
        // Probed by almost every C project.
        check_types.insert("size_t".to_string());
        check_types.insert("void *".to_string());

        Config {
            host: DEFAULT_HOST.to_string(),
            storage_dir: PathBuf::new(),
            root_project: ProjectPath::default(),
            packages_dir_type: PackagesDirType::User,
            proxy: Proxy::default(),
            check_functions: BTreeSet::new(),
            check_includes: BTreeSet::new(),
            check_types,
            check_libraries: BTreeSet::new(),
            check_symbols: BTreeMap::new(),
            bs_insertions: InsertionBlock::default(),
            projects: Vec::new(),
            packages: BTreeMap::new(),
            indirect_dependencies: BTreeMap::new(),
            global_options: BTreeMap::new(),
        }
    }
}

/// Serialized form of the persisted user config.
#[derive(Serialize)]
struct SavedConfig<'a> {
    host: &'a str,
    storage_dir: String,
}

impl Config {
    /// Defaults for this machine: storage under `<home>/.cppan/packages`.
    pub fn new() -> Result<Self> {
        let mut c = Config::default();
        c.storage_dir = root_dir()?.join("packages");
        Ok(c)
    }

    /// System-wide config from the build-time configured path, when one
    /// is configured and present.
    pub fn load_system() -> Result<Self> {
        let mut c = Config::new()?;
        if let Some(path) = option_env!("CPPAN_SYSTEM_CONFIG") {
            let path = Path::new(path);
            if path.exists() {
                c.overlay_file(path)?;
            }
        }
        Ok(c)
    }

    /// User config from `<home>/.cppan/.cppan`, layered over the system
    /// config. Created with the defaults on first run.
    pub fn load_user() -> Result<Self> {
        let file = user_config_file()?;
        let mut c = Config::load_system()?;
        if !file.exists() {
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io("create", parent, e))?;
            }
            c.save(&file)?;
            return Ok(c);
        }
        c.overlay_file(&file)?;
        Ok(c)
    }

    /// Project config: `<dir>/cppan.yml` layered over the user config.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut c = Config::load_user()?;
        c.load_manifest(dir)?;
        Ok(c)
    }

    /// Load `<dir>/cppan.yml` into this config.
    pub fn load_manifest(&mut self, dir: &Path) -> Result<()> {
        let path = dir.join(CPPAN_FILENAME);
        let doc = parse_file(&path)?;
        self.load_document(&doc, CPPAN_FILENAME, dir)
    }

    /// Overlay the common (non-project) keys of another config file.
    fn overlay_file(&mut self, path: &Path) -> Result<()> {
        let doc = parse_file(path)?;
        self.load_common(&doc)
    }

    /// Write back the persistent settings as YAML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let saved = SavedConfig {
            host: &self.host,
            storage_dir: self.storage_dir.display().to_string(),
        };
        let text = serde_yaml::to_string(&saved)
            .map_err(|e| Error::Internal(format!("cannot serialize config: {}", e)))?;
        fs::write(path, text).map_err(|e| Error::io("write", path, e))
    }

    /// Load a full manifest document: common keys plus the `projects`
    /// map (or the root document itself as the single project).
    pub fn load_document(&mut self, doc: &Value, manifest_name: &str, dir: &Path) -> Result<()> {
        self.load_common(doc)?;
        self.projects.clear();

        match doc.get("projects") {
            None => {
                let mut project = self.load_project(doc, dir)?;
                project.package = ProjectPath::default();
                project.cppan_filename = manifest_name.to_string();
                self.projects.push(project);
            }
            Some(Value::Mapping(map)) => {
                for (name, body) in map {
                    let name = key_string(name, "projects")?;
                    if !matches!(body, Value::Mapping(_)) {
                        return Err(Error::Manifest(format!(
                            "project '{}' should be a map",
                            name
                        )));
                    }
                    let mut project = self.load_project(body, dir)?;
                    project.package = self.relative_name_to_absolute(&name)?;
                    project.cppan_filename = manifest_name.to_string();
                    self.projects.push(project);
                }
            }
            Some(_) => return Err(Error::Manifest("'projects' should be a map".to_string())),
        }
        Ok(())
    }

    /// Common keys shared by system, user, and project documents.
    pub fn load_common(&mut self, doc: &Value) -> Result<()> {
        if let Some(host) = get_scalar(doc, "host")? {
            self.host = host;
        }
        if let Some(dir) = get_scalar(doc, "storage_dir")? {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(root) = get_scalar(doc, "root_project")? {
            self.root_project = ProjectPath::parse(&root)?;
        }

        match doc.get("proxy") {
            None => {}
            Some(p @ Value::Mapping(_)) => {
                if let Some(host) = get_scalar(p, "host")? {
                    self.proxy.host = host;
                }
                if let Some(user) = get_scalar(p, "user")? {
                    self.proxy.user = user;
                }
            }
            Some(_) => return Err(Error::Manifest("'proxy' should be a map".to_string())),
        }

        if let Some(s) = get_scalar(doc, "packages_dir")? {
            self.packages_dir_type = PackagesDirType::parse(&s)?;
        }

        self.check_functions
            .extend(get_string_seq(doc, "check_function_exists")?);
        self.check_includes
            .extend(get_string_seq(doc, "check_include_exists")?);
        self.check_types
            .extend(get_string_seq(doc, "check_type_size")?);
        self.check_libraries
            .extend(get_string_seq(doc, "check_library_exists")?);

        if let Some(symbols) = get_map(doc, "check_symbol_exists")? {
            for (symbol, headers) in symbols {
                let symbol = key_string(symbol, "check_symbol_exists")?;
                let set = self.check_symbols.entry(symbol.clone()).or_default();
                match headers {
                    Value::Sequence(_) => set.extend(string_seq(headers, &symbol)?),
                    v => match scalar_str(v) {
                        Some(h) => {
                            set.insert(h);
                        }
                        None => {
                            return Err(Error::Manifest(format!(
                                "headers of symbol '{}' should be a scalar or a sequence",
                                symbol
                            )))
                        }
                    },
                }
            }
        }

        self.bs_insertions.load(doc)
    }

    /// Resolve a manifest package name against `root_project`.
    pub fn relative_name_to_absolute(&self, name: &str) -> Result<ProjectPath> {
        let package = ProjectPath::parse(name)?;
        if package.is_empty() || package.is_absolute() {
            return Ok(package);
        }
        if self.root_project.is_empty() {
            return Err(Error::Manifest(format!(
                "relative package name '{}' used, but 'root_project' is missing",
                name
            )));
        }
        Ok(package.resolve(&self.root_project))
    }

    fn load_project(&self, doc: &Value, dir: &Path) -> Result<Project> {
        let mut p = Project::default();

        // Key presence alone makes these true.
        p.empty = key_present(doc, "empty");
        p.shared_only = key_present(doc, "shared_only");
        p.static_only = key_present(doc, "static_only");
        if p.shared_only && p.static_only {
            return Err(Error::Manifest(
                "project cannot be both 'static_only' and 'shared_only'".to_string(),
            ));
        }

        p.license = get_scalar(doc, "license")?.unwrap_or_default();

        if let Some(root) = get_scalar(doc, "root_directory")? {
            let root = PathBuf::from(root);
            if root.is_absolute()
                || root
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(Error::Manifest(format!(
                    "'root_directory' cannot escape the project directory: {} ({})",
                    root.display(),
                    dir.display()
                )));
            }
            p.root_directory = root;
        }

        match doc.get("include_directories") {
            None => {}
            Some(inc @ Value::Mapping(_)) => {
                p.include_directories.public = get_string_set(inc, "public")?
                    .into_iter()
                    .map(PathBuf::from)
                    .collect();
                p.include_directories.private = get_string_set(inc, "private")?
                    .into_iter()
                    .map(PathBuf::from)
                    .collect();
            }
            Some(_) => {
                return Err(Error::Manifest(
                    "'include_directories' should be a map".to_string(),
                ))
            }
        }
        if p.include_directories.public.is_empty() {
            p.include_directories.public.insert(PathBuf::from("include"));
        }
        p.include_directories
            .public
            .insert(PathBuf::from("${CMAKE_CURRENT_BINARY_DIR}"));

        p.exclude_from_build = get_string_set(doc, "exclude_from_build")?
            .into_iter()
            .map(PathBuf::from)
            .collect();

        p.bs_insertions.load(doc)?;
        self.load_options(doc, &mut p)?;
        self.load_dependencies(doc, &mut p)?;

        p.sources = read_source_patterns(doc, "files")?;
        p.build_files = read_source_patterns(doc, "build")?;

        Ok(p)
    }

    fn load_options(&self, doc: &Value, p: &mut Project) -> Result<()> {
        let Some(options) = get_map(doc, "options")? else {
            return Ok(());
        };
        for (level, body) in options {
            let level = key_string(level, "options")?;
            if !OPTION_LEVELS.contains(&level.as_str()) {
                return Err(Error::Manifest(format!(
                    "unknown option level '{}' (expected any, static, or shared)",
                    level
                )));
            }
            if !matches!(body, Value::Mapping(_)) {
                return Err(Error::Manifest(format!("'{}' should be a map", level)));
            }

            let option = p.options.entry(level).or_default();
            if let Some(defs) = body.get("definitions") {
                for visibility in ["public", "private", "interface"] {
                    for def in get_string_seq(defs, visibility)? {
                        option.definitions.insert((visibility.to_string(), def));
                    }
                }
            }
            option.include_directories = get_string_set(body, "include_directories")?;
            option.link_directories = get_string_set(body, "link_directories")?;
            option.link_libraries = get_string_set(body, "link_libraries")?;
            option.global_definitions = get_string_set(body, "global_definitions")?;
            option.bs_insertions.load(body)?;
        }
        Ok(())
    }

    fn load_dependencies(&self, doc: &Value, p: &mut Project) -> Result<()> {
        let Some(node) = doc.get("dependencies") else {
            return Ok(());
        };
        match node {
            Value::Null => {}
            Value::Sequence(items) => {
                for item in items {
                    let name = scalar_str(item).ok_or_else(|| {
                        Error::Manifest("'dependencies' should contain scalars".to_string())
                    })?;
                    let dep = self.load_dependency(&name, &Value::Null)?;
                    p.dependencies.insert(dep.package.to_string(), dep);
                }
            }
            Value::Mapping(map) => {
                if key_present(node, "private") || key_present(node, "public") {
                    if let Some(private) = get_map(node, "private")? {
                        for (name, body) in private {
                            let name = key_string(name, "private")?;
                            let mut dep = self.load_dependency(&name, body)?;
                            dep.flags.insert(ProjectFlags::PRIVATE);
                            p.dependencies.insert(dep.package.to_string(), dep);
                        }
                    }
                    if let Some(public) = get_map(node, "public")? {
                        for (name, body) in public {
                            let name = key_string(name, "public")?;
                            let dep = self.load_dependency(&name, body)?;
                            p.dependencies.insert(dep.package.to_string(), dep);
                        }
                    }
                } else {
                    for (name, body) in map {
                        let name = key_string(name, "dependencies")?;
                        let dep = self.load_dependency(&name, body)?;
                        p.dependencies.insert(dep.package.to_string(), dep);
                    }
                }
            }
            v => {
                let name = scalar_str(v).ok_or_else(|| {
                    Error::Manifest(
                        "'dependencies' should be a scalar, a sequence, or a map".to_string(),
                    )
                })?;
                let dep = self.load_dependency(&name, &Value::Null)?;
                p.dependencies.insert(dep.package.to_string(), dep);
            }
        }
        Ok(())
    }

    fn load_dependency(&self, name: &str, body: &Value) -> Result<Dependency> {
        let mut dep = Dependency {
            package: self.relative_name_to_absolute(name)?,
            ..Dependency::default()
        };
        match body {
            Value::Null => {}
            Value::Mapping(map) => {
                for (key, value) in map {
                    let key = key_string(key, name)?;
                    match key.as_str() {
                        "version" => {
                            let v = scalar_str(value).ok_or_else(|| {
                                Error::Manifest(format!(
                                    "'version' of dependency '{}' should be a scalar",
                                    name
                                ))
                            })?;
                            dep.version = Version::parse(&v)?;
                        }
                        "package_dir" => {
                            let v = scalar_str(value).ok_or_else(|| {
                                Error::Manifest(format!(
                                    "'package_dir' of dependency '{}' should be a scalar",
                                    name
                                ))
                            })?;
                            dep.package_dir_type = Some(PackagesDirType::parse(&v)?);
                        }
                        "patches" => dep.patches = string_seq(value, "patches")?,
                        other => {
                            return Err(Error::Manifest(format!(
                                "unknown key '{}' in dependency '{}'",
                                other, name
                            )))
                        }
                    }
                }
            }
            v => match scalar_str(v) {
                Some(version) => dep.version = Version::parse(&version)?,
                None => {
                    return Err(Error::Manifest(format!(
                        "dependency '{}' should be a scalar or a map",
                        name
                    )))
                }
            },
        }
        Ok(dep)
    }

    /// Project matching a package path; with a single project the match is
    /// implicit.
    pub fn find_project(&self, package: &ProjectPath) -> Result<&Project> {
        match self.projects.as_slice() {
            [] => Err(Error::Internal("manifest has no projects".to_string())),
            [only] => Ok(only),
            many => many
                .iter()
                .find(|p| &p.package == package)
                .ok_or_else(|| {
                    Error::Internal(format!(
                        "no such project '{}' in dependencies list",
                        package
                    ))
                }),
        }
    }

    /// Cache root for a packages-dir type. Local resolves against the
    /// current working directory; user and system roots come from the
    /// corresponding configs.
    pub fn packages_dir(ty: PackagesDirType) -> Result<PathBuf> {
        match ty {
            PackagesDirType::Local => Ok(PathBuf::from(LOCAL_DIR)),
            PackagesDirType::User => Ok(Config::load_user()?.storage_dir),
            PackagesDirType::System => Ok(Config::load_system()?.storage_dir),
        }
    }
}

impl fmt::Display for PackagesDirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackagesDirType::Local => "local",
            PackagesDirType::User => "user",
            PackagesDirType::System => "system",
        };
        write!(f, "{}", s)
    }
}

// ─── Directories ───────────────────────────────────────────────────

pub fn home_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var_os("USERPROFILE")
            .map(PathBuf::from)
            .ok_or(Error::MissingHome("%USERPROFILE%"))
    }
    #[cfg(not(windows))]
    {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or(Error::MissingHome("$HOME"))
    }
}

pub fn root_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".cppan"))
}

pub fn user_config_file() -> Result<PathBuf> {
    Ok(root_dir()?.join(".cppan"))
}

// ─── Helpers ───────────────────────────────────────────────────────

fn parse_file(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| Error::io("read", path, e))?;
    serde_yaml::from_str(&text)
        .map_err(|e| Error::Manifest(format!("cannot parse '{}': {}", path.display(), e)))
}

/// `files`/`build` accept scalar, sequence, or grouped-map shapes; group
/// bodies may carry a `root` prefixed onto each pattern.
fn read_source_patterns(doc: &Value, key: &str) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    match shape_of(doc, key)? {
        Shape::Missing => {}
        Shape::Scalar(s) => {
            out.insert(s);
        }
        Shape::Sequence(_) => out.extend(get_string_seq(doc, key)?),
        Shape::Map(groups) => {
            for (group, body) in groups {
                let group = key_string(group, key)?;
                match body {
                    Value::Sequence(_) => out.extend(string_seq(body, &group)?),
                    Value::Mapping(_) => {
                        let root = get_scalar(body, "root")?.unwrap_or_default();
                        for file in get_string_seq(body, "files")? {
                            if root.is_empty() {
                                out.insert(file);
                            } else {
                                out.insert(format!("{}/{}", root, file));
                            }
                        }
                    }
                    _ => {
                        return Err(Error::Manifest(format!(
                            "group '{}' cannot be a scalar",
                            group
                        )))
                    }
                }
            }
        }
    }
    Ok(out)
}
