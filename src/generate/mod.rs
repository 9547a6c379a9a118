//! Build-file emitter.
//!
//! Walks the resolved config and per-package manifests and produces the
//! declarative build files a downstream CMake build consumes. Everything
//! here is deterministic: the model's keyed containers are ordered, so the
//! same resolved config always emits byte-identical files.

mod context;
mod meta;
mod package;

pub use context::Context;
pub use meta::{
    print_helper_file, print_meta_config_file, render_helper_file, render_meta_config,
    CMAKE_CONFIG_FILENAME, CMAKE_HELPERS_FILENAME,
};
pub use package::{print_package_config_file, render_package_config};

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::manifest::{Config, LOCAL_DIR};

/// Write the meta and helper files under `<dir>/cppan/`. Runs after every
/// per-package target file has been written.
pub fn create_build_files(config: &Config, dir: &Path) -> Result<()> {
    let out = dir.join(LOCAL_DIR);
    fs::create_dir_all(&out).map_err(|e| Error::io("create", &out, e))?;
    info!("writing build files to {}", out.display());
    print_meta_config_file(config, &out)?;
    print_helper_file(config, &out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::manifest::{Config, Dependency, PackageInfo, Project, ProjectFlags};
    use crate::path::ProjectPath;
    use crate::version::Version;

    fn dependency(package: &str, version: &str, flags: u64) -> Dependency {
        Dependency {
            package: ProjectPath::parse(package).unwrap(),
            version: Version::parse(version).unwrap(),
            flags: ProjectFlags::from_bits(flags),
            ..Dependency::default()
        }
    }

    fn package_config(project: Project) -> Config {
        Config {
            projects: vec![project],
            ..Config::default()
        }
    }

    #[test]
    fn test_package_file_for_library() {
        let mut p = Project::default();
        p.include_directories.public.insert(PathBuf::from("include"));
        let pkg_config = package_config(p);
        let mut parent = Config::default();

        let d = dependency("org.a.b", "1.2.3", 0);
        let (pi, text) = render_package_config(&pkg_config, &d, &mut parent).unwrap();

        assert_eq!(pi.target_name, "org.a.b-1.2.3");
        assert!(text.contains("set(LIBRARY_TYPE STATIC)"));
        assert!(text.contains("if (LIBRARY_TYPE_org_a_b-1_2_3)"));
        assert!(text.contains(
            "add_library                   (org.a.b-1.2.3 ${LIBRARY_TYPE} ${src})"
        ));
        assert!(text.contains("file(GLOB_RECURSE src \"*\")"));
        assert!(text.contains("PUBLIC cppan-helpers"));
        assert!(text.contains("FOLDER \"cppan/org.a.b/1.2.3\""));
        assert!(text.contains(
            "export(TARGETS org.a.b-1.2.3 APPEND FILE ${CMAKE_BINARY_DIR}/cppan.cmake)"
        ));
    }

    #[test]
    fn test_header_only_package_uses_interface_everywhere() {
        let mut p = Project::default();
        p.include_directories.public.insert(PathBuf::from("include"));
        p.dependencies.insert(
            "org.x.y".to_string(),
            dependency("org.x.y", "*", 0),
        );
        let pkg_config = package_config(p);
        let mut parent = Config::default();

        let d = dependency("org.a.b", "1.2.3", 1);
        let (_, text) = render_package_config(&pkg_config, &d, &mut parent).unwrap();

        assert!(text.contains("add_library                   (org.a.b-1.2.3 INTERFACE)"));
        assert!(text.contains("INTERFACE cppan-helpers"));
        assert!(text.contains("INTERFACE include"));
        assert!(text.contains("INTERFACE org.x.y"));
        // No sources, no solution folder for interface targets.
        assert!(!text.contains("GLOB_RECURSE"));
        assert!(!text.contains("FOLDER"));
    }

    #[test]
    fn test_executable_target() {
        let pkg_config = package_config(Project::default());
        let mut parent = Config::default();
        let d = dependency("org.a.tool", "2.0.0", 2);
        let (_, text) = render_package_config(&pkg_config, &d, &mut parent).unwrap();
        assert!(text.contains("add_executable                (org.a.tool-2.0.0 ${src})"));
    }

    #[test]
    fn test_aliases_for_pinned_version_not_for_branch() {
        let pkg_config = package_config(Project::default());
        let mut parent = Config::default();

        let d = dependency("org.a.b", "1.2.3", 0);
        let (_, text) = render_package_config(&pkg_config, &d, &mut parent).unwrap();
        assert!(text.contains("add_library(org.a.b-1.2 ALIAS org.a.b-1.2.3)"));
        assert!(text.contains("add_library(org.a.b-1 ALIAS org.a.b-1.2.3)"));
        assert!(text.contains("add_library(org.a.b ALIAS org.a.b-1.2.3)"));

        let d = dependency("org.a.b", "main", 0);
        let (pi, text) = render_package_config(&pkg_config, &d, &mut parent).unwrap();
        assert_eq!(pi.target_name, "org.a.b-main");
        assert!(!text.contains(" ALIAS "));
    }

    #[test]
    fn test_private_dependency_links_private() {
        let mut p = Project::default();
        let mut dep = dependency("org.x.y", "1", 0);
        dep.flags.insert(ProjectFlags::PRIVATE);
        p.dependencies.insert("org.x.y".to_string(), dep);
        let pkg_config = package_config(p);
        let mut parent = Config::default();

        let d = dependency("org.a.b", "1.2.3", 0);
        let (_, text) = render_package_config(&pkg_config, &d, &mut parent).unwrap();
        assert!(text.contains("PRIVATE org.x.y-1"));
    }

    #[test]
    fn test_executable_adjacency_not_linked() {
        let mut p = Project::default();
        p.dependencies
            .insert("org.x.tool".to_string(), dependency("org.x.tool", "1", 0));
        let pkg_config = package_config(p);
        let mut parent = Config::default();

        let mut d = dependency("org.a.b", "1.2.3", 0);
        d.dependencies
            .insert("org.x.tool".to_string(), dependency("org.x.tool", "1", 2));
        let (_, text) = render_package_config(&pkg_config, &d, &mut parent).unwrap();
        assert!(!text.contains("org.x.tool-1"));
    }

    #[test]
    fn test_option_levels_gated_and_globals_promoted() {
        let mut p = Project::default();
        let opts = p.options.entry("shared".to_string()).or_default();
        opts.definitions
            .insert(("public".to_string(), "BUILDING_SHARED".to_string()));
        opts.global_definitions.insert("GLOBAL_DEF".to_string());
        let any = p.options.entry("any".to_string()).or_default();
        any.definitions
            .insert(("private".to_string(), "ALWAYS".to_string()));
        let pkg_config = package_config(p);
        let mut parent = Config::default();

        let d = dependency("org.a.b", "1.2.3", 0);
        let (_, text) = render_package_config(&pkg_config, &d, &mut parent).unwrap();

        assert!(text.contains("if (LIBRARY_TYPE STREQUAL \"SHARED\")"));
        assert!(text.contains("PUBLIC BUILDING_SHARED"));
        assert!(text.contains("PRIVATE ALWAYS"));
        assert!(parent.global_options["shared"]
            .global_definitions
            .contains("GLOBAL_DEF"));
    }

    #[test]
    fn test_checks_gathered_into_parent() {
        let mut pkg_config = package_config(Project::default());
        pkg_config.check_functions.insert("malloc".to_string());
        pkg_config
            .check_symbols
            .entry("sin".to_string())
            .or_default()
            .insert("math.h".to_string());
        let mut parent = Config::default();

        let d = dependency("org.a.b", "1.2.3", 0);
        render_package_config(&pkg_config, &d, &mut parent).unwrap();
        assert!(parent.check_functions.contains("malloc"));
        assert!(parent.check_symbols.contains_key("sin"));
    }

    #[test]
    fn test_meta_file_wires_subdirectories() {
        let mut config = Config::default();

        let mut direct = dependency("org.a.b", "1.2.3", 8);
        direct.package_dir = PathBuf::from("/storage/org/a/b/1.2.3");
        config
            .packages
            .insert("org.a.b".to_string(), PackageInfo::new(&direct));

        let mut indirect = dependency("org.c.d", "2.0.0", 0);
        indirect.package_dir = PathBuf::from("/storage/org/c/d/2.0.0");
        config
            .indirect_dependencies
            .insert("org.c.d".to_string(), indirect);

        let text = render_meta_config(&config);
        assert!(text.contains("cmake_minimum_required(VERSION 3.0.0)"));
        assert!(text.contains("include(CppanHelpers.cmake)"));
        assert!(text.contains("set(CPPAN_SOURCE_DIR ${CMAKE_CURRENT_SOURCE_DIR})"));
        assert!(text.contains("set(CMAKE_POSITION_INDEPENDENT_CODE ON)"));
        // Subdirectory binary dirs are six hex digits.
        for line in text.lines().filter(|l| l.starts_with("add_subdirectory(")) {
            let bin = line
                .trim_end_matches(')')
                .rsplit(' ')
                .next()
                .unwrap();
            assert_eq!(bin.len(), 6);
            assert!(bin.chars().all(|c| c.is_ascii_hexdigit()));
        }
        assert!(text.contains("add_subdirectory(/storage/org/a/b/1.2.3"));
        assert!(text.contains("add_subdirectory(/storage/org/c/d/2.0.0"));
        assert!(text.contains("add_library                   (cppan INTERFACE)"));
        assert!(text.contains("INTERFACE org.a.b-1.2.3"));
        assert!(text.contains("export(TARGETS cppan APPEND FILE ${CMAKE_BINARY_DIR}/cppan.cmake)"));
    }

    #[test]
    fn test_meta_file_skips_executable_links() {
        let mut config = Config::default();
        let mut exe = dependency("org.a.tool", "1.0.0", 8 | 2);
        exe.package_dir = PathBuf::from("/storage/org/a/tool/1.0.0");
        config
            .packages
            .insert("org.a.tool".to_string(), PackageInfo::new(&exe));

        let text = render_meta_config(&config);
        assert!(text.contains("add_subdirectory(/storage/org/a/tool/1.0.0"));
        assert!(!text.contains("INTERFACE org.a.tool-1.0.0"));
    }

    #[test]
    fn test_helper_file_probes_and_aliases() {
        let mut config = Config::default();
        config.check_functions.insert("malloc".to_string());
        config.check_includes.insert("sys/types.h".to_string());
        config
            .check_symbols
            .entry("sin".to_string())
            .or_default()
            .extend(["math.h".to_string(), "cmath".to_string()]);
        let globals = config.global_options.entry("any".to_string()).or_default();
        globals.global_definitions.insert("UNICODE".to_string());

        let text = render_helper_file(&config);
        assert!(text.contains("set_property(GLOBAL PROPERTY USE_FOLDERS ON)"));
        assert!(text.contains("test_big_endian(WORDS_BIGENDIAN)"));
        assert!(text.contains("check_function_exists(\"malloc\" HAVE_MALLOC)"));
        assert!(text.contains("check_cxx_symbol_exists(\"sin\" \"cmath;math.h;\" HAVE_SIN)"));
        assert!(text.contains("check_include_files(\"sys/types.h\" HAVE_SYS_TYPES_H)"));
        // Seeded default types probe with pointer mangling.
        assert!(text.contains("check_type_size(\"void *\" HAVE_VOID_P)"));
        assert!(text.contains("set(SIZE_OF_VOID_P ${HAVE_VOID_P})"));
        assert!(text.contains("set(SIZEOF_VOID_P ${HAVE_VOID_P})"));
        assert!(text.contains("set(SIZE_OF_SIZE_T ${HAVE_SIZE_T})"));
        assert!(text.contains("add_library(cppan-helpers INTERFACE)"));
        assert!(text.contains("INTERFACE CPPAN"));
        assert!(text.contains("INTERFACE Ws2_32"));
        assert!(text.contains("INTERFACE pthread"));
        assert!(text.contains("INTERFACE UNICODE"));
        assert!(text.contains("export(TARGETS cppan-helpers FILE ${CMAKE_BINARY_DIR}/cppan.cmake)"));
        assert!(text.contains("INTERFACE HOST_BIG_ENDIAN"));
        assert!(text.contains("if (HAVE_MALLOC)"));
        assert!(text.contains("add_custom_target(run-cppan"));
    }

    #[test]
    fn test_emission_is_deterministic() {
        let mut p = Project::default();
        p.include_directories.public.insert(PathBuf::from("include"));
        p.dependencies
            .insert("org.x.y".to_string(), dependency("org.x.y", "1.0.0", 0));
        let pkg_config = package_config(p);

        let d = dependency("org.a.b", "1.2.3", 0);
        let mut parent1 = Config::default();
        let (_, first) = render_package_config(&pkg_config, &d, &mut parent1).unwrap();
        let mut parent2 = Config::default();
        let (_, second) = render_package_config(&pkg_config, &d, &mut parent2).unwrap();
        assert_eq!(first, second);

        let mut config = Config::default();
        let mut dep = dependency("org.a.b", "1.2.3", 8);
        dep.package_dir = PathBuf::from("/s/org/a/b/1.2.3");
        config
            .packages
            .insert("org.a.b".to_string(), PackageInfo::new(&dep));
        assert_eq!(render_meta_config(&config), render_meta_config(&config));
        assert_eq!(render_helper_file(&config), render_helper_file(&config));
    }

    #[test]
    fn test_create_build_files_writes_both() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        create_build_files(&config, dir.path()).unwrap();
        assert!(dir.path().join(LOCAL_DIR).join(CMAKE_CONFIG_FILENAME).is_file());
        assert!(dir
            .path()
            .join(LOCAL_DIR)
            .join(CMAKE_HELPERS_FILENAME)
            .is_file());
    }

    #[test]
    fn test_single_project_no_deps_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cppan.yml"), "files: src/*.cpp\n").unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src").join("a.cpp"), "int main() { return 0; }\n").unwrap();

        let doc: serde_yaml::Value = serde_yaml::from_str("files: src/*.cpp\n").unwrap();
        let mut config = Config::default();
        config.load_document(&doc, "cppan.yml", dir.path()).unwrap();

        crate::sources::find_sources(&mut config.projects[0], dir.path()).unwrap();
        let files = &config.projects[0].files;
        assert_eq!(files.len(), 2);
        assert!(files.contains(std::path::Path::new("cppan.yml")));
        assert!(files.contains(std::path::Path::new("src/a.cpp")));
        assert!(!config.projects[0].header_only);

        // No absolute dependencies: the registry is never contacted.
        crate::resolve::download_dependencies(&mut config).unwrap();
        assert!(config.packages.is_empty());
        assert!(config.indirect_dependencies.is_empty());

        create_build_files(&config, dir.path()).unwrap();
        let out = dir.path().join(LOCAL_DIR);
        assert!(out.join(CMAKE_CONFIG_FILENAME).is_file());
        assert!(out.join(CMAKE_HELPERS_FILENAME).is_file());
    }

    #[test]
    fn test_multi_project_config_requires_matching_project() {
        let mut a = Project::default();
        a.package = ProjectPath::parse("org.me.a").unwrap();
        let mut b = Project::default();
        b.package = ProjectPath::parse("org.me.b").unwrap();
        let pkg_config = Config {
            projects: vec![a, b],
            ..Config::default()
        };
        let mut parent = Config::default();

        let d = dependency("org.me.b", "1.0.0", 0);
        let (pi, _) = render_package_config(&pkg_config, &d, &mut parent).unwrap();
        assert_eq!(pi.target_name, "org.me.b-1.0.0");

        let missing = dependency("org.me.c", "1.0.0", 0);
        assert!(render_package_config(&pkg_config, &missing, &mut parent).is_err());
    }
}
