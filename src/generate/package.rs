//! Per-package target file.
//!
//! For each cached package the emitter loads the package's own manifest
//! and writes one declarative build file next to its sources: library-type
//! selection, source list, include/link propagation per visibility,
//! option-gated definitions, version aliases, and an export directive.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use super::context::Context;
use crate::error::{Error, Result};
use crate::manifest::{Config, Dependency, InsertionBlock, PackageInfo, Project, ProjectFlags};
use crate::version;

/// Names padded so target declarations line up.
fn padded(name: &str) -> String {
    format!("{:<30}(", name)
}

pub fn print_package_config_file(
    pkg_config: &Config,
    d: &Dependency,
    parent: &mut Config,
    out: &Path,
) -> Result<PackageInfo> {
    let (pi, text) = render_package_config(pkg_config, d, parent)?;
    fs::write(out, text).map_err(|e| Error::io("write", out, e))?;
    Ok(pi)
}

pub fn render_package_config(
    pkg_config: &Config,
    d: &Dependency,
    parent: &mut Config,
) -> Result<(PackageInfo, String)> {
    let pi = PackageInfo::new(d);
    let header_only = d.flags.contains(ProjectFlags::HEADER_ONLY);
    let p = pkg_config.find_project(&d.package)?;

    gather_checks(pkg_config, parent);

    let mut ctx = Context::new();
    ctx.add_line("#");
    ctx.add_line("# cppan");
    ctx.add_line(format!("# package: {}", d.package));
    ctx.add_line(format!("# version: {}", d.version));
    ctx.add_line("#");
    ctx.add_empty();

    // settings
    ctx.section("settings");
    ctx.add_line("set(LIBRARY_TYPE STATIC)");
    ctx.add_empty();
    ctx.add_line("if (\"${CPPAN_BUILD_SHARED_LIBS}\" STREQUAL \"ON\")");
    ctx.increase_indent();
    ctx.add_line("set(LIBRARY_TYPE SHARED)");
    ctx.decrease_indent();
    ctx.add_line("endif()");
    ctx.add_empty();
    ctx.add_line(format!("if (LIBRARY_TYPE_{})", pi.variable_name));
    ctx.increase_indent();
    ctx.add_line(format!(
        "set(LIBRARY_TYPE ${{LIBRARY_TYPE_{}}})",
        pi.variable_name
    ));
    ctx.decrease_indent();
    ctx.add_line("endif()");
    if p.static_only {
        ctx.add_line("set(LIBRARY_TYPE STATIC)");
    } else if p.shared_only {
        ctx.add_line("set(LIBRARY_TYPE SHARED)");
    }
    ctx.empty_lines(1);

    print_bs_insertion(&mut ctx, pkg_config, p, "pre sources", |b| b.pre_sources.as_str());

    // sources
    if !header_only {
        ctx.section("sources");
        if p.build_files.is_empty() {
            ctx.add_line("file(GLOB_RECURSE src \"*\")");
        } else {
            ctx.add_line("set(src");
            ctx.increase_indent();
            for f in &p.build_files {
                ctx.add_line(format!(
                    "${{CMAKE_CURRENT_SOURCE_DIR}}/{}",
                    f.replace('\\', "/")
                ));
            }
            ctx.decrease_indent();
            ctx.add_line(")");
        }
        ctx.add_empty();
    }

    if !p.exclude_from_build.is_empty() {
        ctx.section("exclude files");
        for f in &p.exclude_from_build {
            ctx.add_line(format!(
                "list(REMOVE_ITEM src \"${{CMAKE_CURRENT_SOURCE_DIR}}/{}\")",
                f.display()
            ));
        }
        ctx.empty_lines(1);
    }

    print_bs_insertion(&mut ctx, pkg_config, p, "post sources", |b| b.post_sources.as_str());

    for opts in p.options.values() {
        for dir in &opts.link_directories {
            ctx.add_line(format!("link_directories({})", dir));
        }
    }
    ctx.empty_lines(1);

    // target
    ctx.section(&format!("target: {}", pi.target_name));
    if d.flags.contains(ProjectFlags::EXECUTABLE) {
        ctx.add_line(format!("{}{} ${{src}})", padded("add_executable"), pi.target_name));
    } else if header_only {
        ctx.add_line(format!("{}{} INTERFACE)", padded("add_library"), pi.target_name));
    } else {
        ctx.add_line(format!(
            "{}{} ${{LIBRARY_TYPE}} ${{src}})",
            padded("add_library"),
            pi.target_name
        ));
    }

    // includes
    if !p.include_directories.is_empty() {
        ctx.add_line(format!(
            "{}{}",
            padded("target_include_directories"),
            pi.target_name
        ));
        ctx.increase_indent();
        if header_only {
            for dir in &p.include_directories.public {
                ctx.add_line(format!("INTERFACE {}", dir.display()));
            }
        } else {
            for dir in &p.include_directories.public {
                ctx.add_line(format!("PUBLIC {}", dir.display()));
            }
            for dir in &p.include_directories.private {
                ctx.add_line(format!("PRIVATE {}", dir.display()));
            }
        }
        ctx.decrease_indent();
        ctx.add_line(")");
    }

    // link edges: the helpers target plus every non-executable dependency
    ctx.add_line(format!("{}{}", padded("target_link_libraries"), pi.target_name));
    ctx.increase_indent();
    ctx.add_line(format!(
        "{} cppan-helpers",
        if header_only { "INTERFACE" } else { "PUBLIC" }
    ));
    for (name, dep) in &p.dependencies {
        if d.dependencies
            .get(name)
            .is_some_and(|adj| adj.flags.contains(ProjectFlags::EXECUTABLE))
        {
            continue;
        }
        let dep_info = PackageInfo::new(dep);
        let visibility = if header_only {
            "INTERFACE"
        } else if dep.flags.contains(ProjectFlags::PRIVATE) {
            "PRIVATE"
        } else {
            "PUBLIC"
        };
        ctx.add_line(format!("{} {}", visibility, dep_info.target_name));
    }
    ctx.decrease_indent();
    ctx.add_line(")");

    // solution folder
    if !header_only {
        ctx.add_line(format!(
            "{}{} PROPERTIES",
            padded("set_target_properties"),
            pi.target_name
        ));
        ctx.add_line(format!("    FOLDER \"cppan/{}/{}\"", d.package, d.version));
        ctx.add_line(")");
        ctx.empty_lines(1);
    }

    // per-level options
    for (level, opts) in &p.options {
        ctx.empty_lines(1);

        let gated = level != "any";
        if gated {
            ctx.add_line(format!(
                "if (LIBRARY_TYPE STREQUAL \"{}\")",
                level.to_uppercase()
            ));
        }

        if !opts.definitions.is_empty() {
            ctx.add_line(format!(
                "{}{}",
                padded("target_compile_definitions"),
                pi.target_name
            ));
            ctx.increase_indent();
            for (visibility, def) in &opts.definitions {
                if header_only {
                    ctx.add_line(format!("INTERFACE {}", def));
                } else {
                    ctx.add_line(format!("{} {}", visibility.to_uppercase(), def));
                }
            }
            ctx.decrease_indent();
            ctx.add_line(")");
        }
        print_option_set(&mut ctx, &pi, header_only, &opts.include_directories, "target_include_directories");
        print_option_set(&mut ctx, &pi, header_only, &opts.link_libraries, "target_link_libraries");

        if gated {
            ctx.add_line("endif()");
        }

        if !opts.global_definitions.is_empty() {
            parent
                .global_options
                .entry(level.clone())
                .or_default()
                .global_definitions
                .extend(opts.global_definitions.iter().cloned());
        }
    }

    ctx.empty_lines(1);
    ctx.add_line(format!("set(lib {})", pi.target_name));
    ctx.add_line(format!("set(target {})", pi.target_name));
    ctx.empty_lines(1);

    print_bs_insertion(&mut ctx, pkg_config, p, "post target", |b| b.post_target.as_str());

    // aliases at coarser version granularity, plus the bare package name
    if !d.version.is_branch() {
        ctx.section("aliases");
        let mut ver = d.version.clone();
        ver.patch = version::ANY;
        ctx.add_line(format!(
            "add_library({}-{} ALIAS {})",
            d.package,
            ver.to_any_version(),
            pi.target_name
        ));
        ver.minor = version::ANY;
        ctx.add_line(format!(
            "add_library({}-{} ALIAS {})",
            d.package,
            ver.to_any_version(),
            pi.target_name
        ));
        ctx.add_line(format!("add_library({} ALIAS {})", d.package, pi.target_name));
        ctx.add_empty();
    }

    ctx.section("export");
    ctx.add_line(format!(
        "export(TARGETS {} APPEND FILE ${{CMAKE_BINARY_DIR}}/cppan.cmake)",
        pi.target_name
    ));
    ctx.empty_lines(1);

    print_bs_insertion(&mut ctx, pkg_config, p, "post alias", |b| b.post_alias.as_str());

    ctx.empty_lines(1);
    ctx.delimiter();
    ctx.add_empty();

    Ok((pi, ctx.text()))
}

/// Merge the package's feature-probe sets into the outer config so the
/// helper file carries every probe.
fn gather_checks(pkg_config: &Config, parent: &mut Config) {
    parent
        .check_functions
        .extend(pkg_config.check_functions.iter().cloned());
    parent
        .check_includes
        .extend(pkg_config.check_includes.iter().cloned());
    parent
        .check_types
        .extend(pkg_config.check_types.iter().cloned());
    parent
        .check_libraries
        .extend(pkg_config.check_libraries.iter().cloned());
    for (symbol, headers) in &pkg_config.check_symbols {
        parent
            .check_symbols
            .entry(symbol.clone())
            .or_default()
            .extend(headers.iter().cloned());
    }
}

fn print_option_set(
    ctx: &mut Context,
    pi: &PackageInfo,
    header_only: bool,
    items: &BTreeSet<String>,
    command: &str,
) {
    if items.is_empty() {
        return;
    }
    ctx.add_line(format!("{}({}", command, pi.target_name));
    ctx.increase_indent();
    for item in items {
        ctx.add_line(format!(
            "{} {}",
            if header_only { "INTERFACE" } else { "PUBLIC" },
            item
        ));
    }
    ctx.decrease_indent();
    ctx.add_line(")");
    ctx.add_empty();
}

/// Insertion blocks print in order: the multi-project config's block, the
/// project's own, then per-option-level blocks gated on LIBRARY_TYPE.
fn print_bs_insertion(
    ctx: &mut Context,
    pkg_config: &Config,
    p: &Project,
    title: &str,
    field: impl Fn(&InsertionBlock) -> &str,
) {
    ctx.section(title);
    if pkg_config.projects.len() > 1 {
        ctx.add_line(field(&pkg_config.bs_insertions));
        ctx.empty_lines(1);
    }
    ctx.add_line(field(&p.bs_insertions));
    ctx.empty_lines(1);

    for (level, opts) in &p.options {
        let text = field(&opts.bs_insertions);
        if text.is_empty() {
            continue;
        }
        if level == "any" {
            ctx.add_line(text);
        } else {
            ctx.add_line(format!(
                "if (LIBRARY_TYPE STREQUAL \"{}\")",
                level.to_uppercase()
            ));
            ctx.increase_indent();
            ctx.add_line(text);
            ctx.decrease_indent();
            ctx.add_line("endif()");
            ctx.empty_lines(1);
        }
    }
    ctx.empty_lines(1);
}
