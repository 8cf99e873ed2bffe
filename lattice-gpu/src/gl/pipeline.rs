//! Shader compilation for the GL ES backend, with `codespan-reporting`
//! diagnostics on failure (§4.3).

use super::Context;
use crate::error::ShaderCompileError;
use crate::handles::Program;
use crate::hub::ProgramEntry;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term::{self, termcolor::Buffer};
use glow::HasContext;

/// Compiles `source` as a fragment shader paired with a fixed full-screen
/// vertex shader, following the teacher's `with_error_scope` pattern of
/// compiling then checking a validation log rather than trusting a bool.
pub(super) fn compile(ctx: &Context, source: &str, label: &str) -> Result<Program, ShaderCompileError> {
    let gl = ctx.gl();
    unsafe {
        let vertex = compile_stage(gl, glow::VERTEX_SHADER, FULLSCREEN_VERTEX_SHADER, label)?;
        let fragment = compile_stage(gl, glow::FRAGMENT_SHADER, source, label)?;

        let program = gl
            .create_program()
            .map_err(|e| compile_error(label, source, &e))?;
        gl.attach_shader(program, vertex);
        gl.attach_shader(program, fragment);
        gl.link_program(program);
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(compile_error(label, source, &log));
        }

        let key = ctx.hub.write().unwrap().programs.insert(ProgramEntry {
            raw: program,
            source_hash: crate::program_bank::source_hash(source),
            refcount: 1,
        });
        Ok(Program { raw: key })
    }
}

unsafe fn compile_stage(
    gl: &glow::Context,
    kind: u32,
    source: &str,
    label: &str,
) -> Result<glow::Shader, ShaderCompileError> {
    let shader = gl
        .create_shader(kind)
        .map_err(|e| compile_error(label, source, &e))?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(compile_error(label, source, &log));
    }
    Ok(shader)
}

/// Minimal full-screen triangle vertex shader: every operation's output is
/// a rectangular framebuffer region, so all fragment programs share it.
const FULLSCREEN_VERTEX_SHADER: &str = "\
attribute vec2 a_position;
attribute vec2 a_texcoord;
varying vec2 v_texcoord;
void main() {
    v_texcoord = a_texcoord;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

fn compile_error(label: &str, source: &str, raw_log: &str) -> ShaderCompileError {
    let rendered = render_diagnostic(label, source, raw_log);
    log::error!("lattice-gpu: shader '{label}' failed to compile:\n{rendered}");
    ShaderCompileError {
        source_name: label.to_string(),
        log: raw_log.to_string(),
        rendered,
    }
}

/// Best-effort: parses `line:col: message` out of the driver log (the
/// common ANGLE/Mesa shape) and renders a source snippet; falls back to
/// the raw log verbatim if the shape doesn't match.
fn render_diagnostic(label: &str, source: &str, raw_log: &str) -> String {
    let file = SimpleFile::new(label, source);
    let mut buffer = Buffer::no_color();
    let config = codespan_reporting::term::Config::default();

    for line in raw_log.lines() {
        if let Some((line_no, message)) = parse_driver_log_line(line) {
            let offset = line_offset(source, line_no);
            let diagnostic = Diagnostic::error()
                .with_message(message.to_string())
                .with_labels(vec![Label::primary((), offset..offset)]);
            let _ = term::emit(&mut buffer, &config, &file, &diagnostic);
        }
    }

    if buffer.as_slice().is_empty() {
        raw_log.to_string()
    } else {
        String::from_utf8_lossy(buffer.as_slice()).into_owned()
    }
}

fn parse_driver_log_line(line: &str) -> Option<(usize, &str)> {
    // ANGLE/desktop-GL shape: "0:12: error: ...", ES-shape may omit the
    // leading source-string index.
    let mut parts = line.splitn(3, ':');
    let _source_index = parts.next()?;
    let line_no: usize = parts.next()?.trim().parse().ok()?;
    let message = parts.next()?.trim();
    Some((line_no, message))
}

fn line_offset(source: &str, line_no: usize) -> usize {
    source
        .lines()
        .take(line_no.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum()
}
