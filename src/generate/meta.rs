//! Meta and helper files at the project root.
//!
//! The meta file wires every cached package in as a subdirectory and
//! declares the `cppan` interface library; the helper file carries the
//! feature probes, the `cppan-helpers` interface target, and the
//! regenerator target.

use std::fs;
use std::path::Path;

use sha1::{Digest, Sha1};

use super::context::Context;
use crate::error::{Error, Result};
use crate::manifest::{Config, ProjectFlags};

pub const CMAKE_CONFIG_FILENAME: &str = "CMakeLists.txt";
pub const CMAKE_HELPERS_FILENAME: &str = "CppanHelpers.cmake";

/// Binary directory for a dependency subdirectory: the first six hex
/// digits of SHA-1 over `<parent>/<leaf>` of its version directory.
fn binary_dir_for(package_dir: &Path) -> String {
    let leaf = package_dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = package_dir
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let key = format!("{}/{}", parent, leaf);
    hex::encode(Sha1::digest(key.as_bytes()))[..6].to_string()
}

fn add_dep_subdir(ctx: &mut Context, package_dir: &Path) {
    let src_dir = package_dir.to_string_lossy().replace('\\', "/");
    ctx.add_line(format!(
        "add_subdirectory({} {})",
        src_dir,
        binary_dir_for(package_dir)
    ));
}

pub fn print_meta_config_file(config: &Config, out_dir: &Path) -> Result<()> {
    let path = out_dir.join(CMAKE_CONFIG_FILENAME);
    fs::write(&path, render_meta_config(config)).map_err(|e| Error::io("write", &path, e))
}

pub fn render_meta_config(config: &Config) -> String {
    let mut ctx = Context::new();
    ctx.add_line("#");
    ctx.add_line("# cppan");
    ctx.add_line("# meta config file");
    ctx.add_line("#");
    ctx.add_empty();
    ctx.add_line("cmake_minimum_required(VERSION 3.0.0)");
    ctx.add_empty();
    ctx.add_line(format!("include({})", CMAKE_HELPERS_FILENAME));
    ctx.add_empty();

    ctx.section("variables");
    ctx.add_line("set(USES_CPPAN 1 CACHE STRING \"CPPAN is turned on\")");
    ctx.add_empty();
    ctx.add_line("set(CPPAN_SOURCE_DIR ${CMAKE_CURRENT_SOURCE_DIR})");
    ctx.add_line("set(CPPAN_BINARY_DIR ${CMAKE_CURRENT_BINARY_DIR})");
    ctx.add_empty();
    ctx.add_line("set(CMAKE_POSITION_INDEPENDENT_CODE ON)");
    ctx.add_empty();

    if !config.packages.is_empty() {
        ctx.section("direct dependencies");
        for pi in config.packages.values() {
            add_dep_subdir(&mut ctx, &pi.dependency.package_dir);
        }
        ctx.add_empty();
    }

    if !config.indirect_dependencies.is_empty() {
        ctx.section("indirect dependencies");
        for dep in config.indirect_dependencies.values() {
            add_dep_subdir(&mut ctx, &dep.package_dir);
        }
        ctx.add_empty();
    }

    ctx.section("main library");
    ctx.add_line(format!("{:<30}(cppan INTERFACE)", "add_library"));
    if !config.packages.is_empty() {
        ctx.add_line(format!("{:<30}(cppan", "target_link_libraries"));
        ctx.increase_indent();
        for pi in config.packages.values() {
            if pi.dependency.flags.contains(ProjectFlags::EXECUTABLE) {
                continue;
            }
            ctx.add_line(format!("INTERFACE {}", pi.target_name));
        }
        ctx.decrease_indent();
        ctx.add_line(")");
        ctx.add_empty();
    }
    ctx.add_line("export(TARGETS cppan APPEND FILE ${CMAKE_BINARY_DIR}/cppan.cmake)");

    ctx.empty_lines(1);
    ctx.delimiter();
    ctx.add_empty();

    ctx.text()
}

pub fn print_helper_file(config: &Config, out_dir: &Path) -> Result<()> {
    let path = out_dir.join(CMAKE_HELPERS_FILENAME);
    fs::write(&path, render_helper_file(config)).map_err(|e| Error::io("write", &path, e))
}

fn convert_function(s: &str) -> String {
    format!("HAVE_{}", s.to_uppercase())
}

fn convert_include(s: &str) -> String {
    let mut out = format!("HAVE_{}", s.to_uppercase());
    out = out
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    out
}

fn convert_type(s: &str, prefix: &str) -> String {
    let mut out = String::from(prefix);
    for c in s.to_uppercase().chars() {
        if c == '*' {
            out.push('P');
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

pub fn render_helper_file(config: &Config) -> String {
    let mut ctx = Context::new();
    ctx.add_line("#");
    ctx.add_line("# cppan");
    ctx.add_line("# helper routines");
    ctx.add_line("#");
    ctx.add_empty();

    ctx.section("cmake setup");
    ctx.add_line("# Use solution folders.\nset_property(GLOBAL PROPERTY USE_FOLDERS ON)");
    ctx.add_empty();

    ctx.section("cmake includes");
    ctx.add_line(
        "include(CheckCXXSymbolExists)\n\
         include(CheckFunctionExists)\n\
         include(CheckIncludeFiles)\n\
         include(CheckLibraryExists)\n\
         include(CheckTypeSize)\n\
         include(TestBigEndian)",
    );
    ctx.add_empty();

    ctx.section("common checks");
    ctx.add_line("test_big_endian(WORDS_BIGENDIAN)");
    // endianness aliases under the names different projects probe for
    ctx.add_line("set(BIG_ENDIAN ${WORDS_BIGENDIAN} CACHE STRING \"endianness alias\")");
    ctx.add_line("set(BIGENDIAN ${WORDS_BIGENDIAN} CACHE STRING \"endianness alias\")");
    ctx.add_line("set(HOST_BIG_ENDIAN ${WORDS_BIGENDIAN} CACHE STRING \"endianness alias\")");
    ctx.add_empty();

    ctx.section("checks");
    for v in &config.check_functions {
        ctx.add_line(format!(
            "check_function_exists(\"{}\" {})",
            v,
            convert_function(v)
        ));
    }
    ctx.empty_lines(1);
    for (symbol, headers) in &config.check_symbols {
        let mut joined = String::new();
        for h in headers {
            joined.push_str(h);
            joined.push(';');
        }
        ctx.add_line(format!(
            "check_cxx_symbol_exists(\"{}\" \"{}\" {})",
            symbol,
            joined,
            convert_function(symbol)
        ));
    }
    ctx.empty_lines(1);
    for v in &config.check_includes {
        ctx.add_line(format!(
            "check_include_files(\"{}\" {})",
            v,
            convert_include(v)
        ));
    }
    ctx.empty_lines(1);
    for v in &config.check_types {
        ctx.add_line(format!("check_type_size(\"{}\" {})", v, convert_type(v, "HAVE_")));
    }
    ctx.empty_lines(1);

    for v in &config.check_types {
        let have = convert_type(v, "HAVE_");
        ctx.add_line(format!("if ({})", have));
        ctx.increase_indent();
        ctx.add_line(format!("set({} ${{{}}})", convert_type(v, "SIZE_OF_"), have));
        ctx.add_line(format!("set({} ${{{}}})", convert_type(v, "SIZEOF_"), have));
        ctx.decrease_indent();
        ctx.add_line("endif()");
        ctx.add_empty();
    }
    ctx.empty_lines(1);

    ctx.section("library");
    ctx.add_line("add_library(cppan-helpers INTERFACE)");
    ctx.add_empty();

    // builds under cppan are marked
    ctx.add_line("target_compile_definitions(cppan-helpers");
    ctx.increase_indent();
    ctx.add_line("INTERFACE CPPAN");
    ctx.decrease_indent();
    ctx.add_line(")");
    ctx.add_empty();

    ctx.add_line(
        "if (WIN32)\n\
         target_link_libraries(cppan-helpers\n\
         \x20   INTERFACE Ws2_32\n\
         )\n\
         else()\n\
         target_link_libraries(cppan-helpers\n\
         \x20   INTERFACE pthread\n\
         )\n\
         endif()",
    );
    ctx.add_empty();

    // No APPEND: this is the first write that clears cppan.cmake.
    ctx.add_line("export(TARGETS cppan-helpers FILE ${CMAKE_BINARY_DIR}/cppan.cmake)");
    ctx.empty_lines(1);

    ctx.section("global definitions");
    let global_defs: Vec<&String> = config
        .global_options
        .values()
        .flat_map(|o| o.global_definitions.iter())
        .collect();
    if !global_defs.is_empty() {
        ctx.add_line("target_compile_definitions(cppan-helpers");
        ctx.increase_indent();
        for def in global_defs {
            ctx.add_line(format!("INTERFACE {}", def));
        }
        ctx.decrease_indent();
        ctx.add_line(")");
        ctx.add_empty();
    }

    ctx.section("definitions");
    add_if_definition(
        &mut ctx,
        "WORDS_BIGENDIAN",
        &["BIGENDIAN", "BIG_ENDIAN", "HOST_BIG_ENDIAN"],
    );
    for v in &config.check_functions {
        add_if_definition(&mut ctx, &convert_function(v), &[]);
    }
    for symbol in config.check_symbols.keys() {
        add_if_definition(&mut ctx, &convert_function(symbol), &[]);
    }
    for v in &config.check_includes {
        add_if_definition(&mut ctx, &convert_include(v), &[]);
    }
    for v in &config.check_types {
        add_if_definition(&mut ctx, &convert_type(v, "HAVE_"), &[]);
    }

    ctx.section("cppan regenerator");
    ctx.add_line(
        "add_custom_target(run-cppan\n\
         \x20   COMMAND cppan\n\
         \x20   WORKING_DIRECTORY ${PROJECT_SOURCE_DIR}\n\
         \x20   DEPENDS ${PROJECT_SOURCE_DIR}/cppan.yml\n\
         \x20   SOURCES ${PROJECT_SOURCE_DIR}/cppan.yml\n\
         )\n\
         set_target_properties(run-cppan PROPERTIES\n\
         \x20   FOLDER \"cppan\"\n\
         )",
    );
    ctx.add_empty();

    ctx.delimiter();
    ctx.add_empty();

    ctx.text()
}

/// Probe-conditional interface definitions: the probe name itself plus
/// any extra aliases.
fn add_if_definition(ctx: &mut Context, name: &str, extra: &[&str]) {
    ctx.add_line(format!("if ({})", name));
    ctx.increase_indent();
    ctx.add_line("target_compile_definitions(cppan-helpers");
    ctx.increase_indent();
    ctx.add_line(format!("INTERFACE {}", name));
    for def in extra {
        ctx.add_line(format!("INTERFACE {}", def));
    }
    ctx.decrease_indent();
    ctx.add_line(")");
    ctx.decrease_indent();
    ctx.add_line("endif()");
    ctx.add_empty();
}
