//! Merges resolver output back into the scanned block structure.

use std::collections::HashMap;

use macsym_engine::ResolutionResult;
use macsym_scanner::{CrashLineKind, ThreadBlock};

/// Renders the output lines of one block.
///
/// Lines keep their original relative order; only blocks were reordered
/// (crashed-first) by the scanner. The visible frame numbering restarts at
/// 0 per block, counts frame lines only, and is independent of the
/// internal line index used for correlation.
pub fn render_block(
    block: &ThreadBlock,
    results: &HashMap<usize, ResolutionResult>,
) -> Vec<String> {
    let mut output = Vec::new();
    let mut frame_counter = 0u32;

    for line in &block.lines {
        match line.kind {
            CrashLineKind::Thread(_) => output.push(line.text.clone()),
            CrashLineKind::Stack(ref frame) => {
                match results.get(&line.index).and_then(ResolutionResult::display_text) {
                    Some(text) => output.push(format!("{frame_counter}   {text}")),
                    None => output.push(format!(
                        "{} {} {} {}",
                        frame.frame_index,
                        frame.image_name,
                        frame.target_address,
                        frame.load_address
                    )),
                }
                frame_counter += 1;
            }
            CrashLineKind::Symbolized(_) => {
                output.push(line.text.clone());
                frame_counter += 1;
            }
            CrashLineKind::Diagnostic(ref frame) => {
                match results.get(&line.index).and_then(ResolutionResult::display_text) {
                    Some(text) => output.push(format!(
                        "{}{}  {}  ({})  [{}]",
                        frame.indent,
                        frame_counter,
                        text,
                        frame.image_name,
                        frame.target_address
                    )),
                    None => output.push(line.text.clone()),
                }
                frame_counter += 1;
            }
            // Header info is surfaced separately; image rows and noise do
            // not belong to thread output.
            _ => {}
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use macsym_scanner::{CrashLine, DiagnosticFrame, StackFrame, ThreadHeader};
    use similar_asserts::assert_eq;

    use super::*;

    fn result(resolved: &str) -> ResolutionResult {
        ResolutionResult {
            status: Some(0),
            resolved: resolved.into(),
            error: String::new(),
        }
    }

    #[test]
    fn test_frame_numbering_restarts_and_skips_headers() {
        let block = ThreadBlock {
            lines: vec![
                CrashLine {
                    index: 40,
                    text: "Thread 3 Crashed:".into(),
                    kind: CrashLineKind::Thread(ThreadHeader {
                        thread_index: 3,
                        crashed: true,
                        name: String::new(),
                    }),
                },
                CrashLine {
                    index: 41,
                    text: "0   Webex   0x2f0 0x100 + 496".into(),
                    kind: CrashLineKind::Stack(StackFrame {
                        frame_index: 0,
                        image_name: "Webex".into(),
                        target_address: "0x2f0".into(),
                        load_address: "0x100".into(),
                    }),
                },
                CrashLine {
                    index: 42,
                    text: "1   Webex   0x3f0 0x100 + 752".into(),
                    kind: CrashLineKind::Stack(StackFrame {
                        frame_index: 1,
                        image_name: "Webex".into(),
                        target_address: "0x3f0".into(),
                        load_address: "0x100".into(),
                    }),
                },
            ],
        };

        let results = HashMap::from([
            (41usize, result("main (in Webex) (app.cpp:7)")),
            (42usize, result("start (in Webex) (app.cpp:1)")),
        ]);

        let rendered = render_block(&block, &results);
        assert_eq!(
            rendered,
            vec![
                "Thread 3 Crashed:".to_owned(),
                "0   main (in Webex) (app.cpp:7)".to_owned(),
                "1   start (in Webex) (app.cpp:1)".to_owned(),
            ]
        );
    }

    #[test]
    fn test_unresolved_frame_falls_back_to_raw_fields() {
        let block = ThreadBlock {
            lines: vec![CrashLine {
                index: 7,
                text: "0   Ghost   0x2f0 0x100 + 496".into(),
                kind: CrashLineKind::Stack(StackFrame {
                    frame_index: 0,
                    image_name: "Ghost".into(),
                    target_address: "0x2f0".into(),
                    load_address: "0x100".into(),
                }),
            }],
        };

        let rendered = render_block(&block, &HashMap::new());
        assert_eq!(rendered, vec!["0 Ghost 0x2f0 0x100".to_owned()]);
    }

    #[test]
    fn test_diagnostic_frame_rendering() {
        let block = ThreadBlock {
            lines: vec![CrashLine {
                index: 3,
                text: "  21  ??? (Webex + 496) [0x2f0]".into(),
                kind: CrashLineKind::Diagnostic(DiagnosticFrame {
                    indent: "  ".into(),
                    frame_index: 21,
                    symbol: "???".into(),
                    image_name: "Webex".into(),
                    target_address: "0x2f0".into(),
                }),
            }],
        };

        let results = HashMap::from([(3usize, result("main (in Webex)"))]);
        let rendered = render_block(&block, &results);
        assert_eq!(rendered, vec!["  0  main (in Webex)  (Webex)  [0x2f0]".to_owned()]);
    }
}
