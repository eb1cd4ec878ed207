//! End-to-end fixture harness: every directory under `tests/programs/`
//! holds a MiniPascal program plus a `case.yaml` describing how the pipeline
//! must treat it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use minipascal::PipelineError;
use minipascal::console::BufferedConsole;
use minipascal::run_source;
use minipascal::vocab::Vocabulary;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum CaseClass {
    RuntimeSuccess,
    FrontendError,
    SemanticError,
    RuntimeError,
}

impl CaseClass {
    fn required_exit_code(self) -> i32 {
        match self {
            CaseClass::RuntimeSuccess => 0,
            CaseClass::FrontendError => 1,
            CaseClass::SemanticError => 2,
            CaseClass::RuntimeError => 3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExpectedOutcome {
    exit_code: i32,
    #[serde(default)]
    stdout_file: Option<String>,
    #[serde(default)]
    diagnostic_contains: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaseSpec {
    class: CaseClass,
    #[serde(default)]
    stdin: Vec<String>,
    expected: ExpectedOutcome,
}

#[derive(Debug)]
struct Case {
    name: String,
    dir: PathBuf,
    program_path: PathBuf,
    spec: CaseSpec,
}

impl Case {
    fn read_text(&self, relative_path: &str) -> Result<String> {
        fs::read_to_string(self.dir.join(relative_path))
            .with_context(|| format!("Reading {} fixture file {}", self.name, relative_path))
    }
}

fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let mut cases = Vec::new();

    for entry in
        fs::read_dir(programs_dir).with_context(|| format!("Reading {}", programs_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }

        let case_path = path.join("case.yaml");
        if !case_path.exists() {
            continue;
        }

        let program_path = path.join("program.pas");
        ensure!(
            program_path.exists(),
            "Missing program.pas for case {}",
            path.display()
        );

        let case_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid case directory name {}", path.display()))?;
        let case_raw = fs::read_to_string(&case_path)
            .with_context(|| format!("Reading {}", case_path.display()))?;
        let spec: CaseSpec = serde_yaml::from_str(&case_raw)
            .with_context(|| format!("Parsing {}", case_path.display()))?;

        cases.push(Case {
            name: case_name,
            dir: path,
            program_path,
            spec,
        });
    }

    ensure!(
        !cases.is_empty(),
        "No test cases found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}

fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}

fn run_case(case: &Case) -> Result<(Result<(), PipelineError>, Vec<String>)> {
    let source = fs::read_to_string(&case.program_path)
        .with_context(|| format!("Reading {}", case.name))?;
    let vocab = Vocabulary::default();
    let mut console = BufferedConsole::with_inputs(case.spec.stdin.iter().cloned());
    let result = run_source(&source, &vocab, &mut console);
    Ok((result, console.output().to_vec()))
}

#[test]
fn runs_fixture_programs() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        ensure!(
            case.spec.expected.exit_code == case.spec.class.required_exit_code(),
            "Case {} expected exit code {} does not match class {:?}",
            case.name,
            case.spec.expected.exit_code,
            case.spec.class
        );

        let (result, output) = run_case(&case)?;
        match case.spec.class {
            CaseClass::RuntimeSuccess => {
                if let Err(error) = &result {
                    anyhow::bail!("Case {} failed unexpectedly: {error}", case.name);
                }
                let stdout_file = case
                    .spec
                    .expected
                    .stdout_file
                    .as_deref()
                    .with_context(|| format!("Missing stdout_file in {}", case.name))?;
                let expected = case.read_text(stdout_file)?;
                let actual = normalize_output(&output.join("\n"));
                assert_eq!(
                    actual,
                    normalize_output(&expected),
                    "Output mismatch for {}",
                    case.name
                );
            }
            CaseClass::FrontendError | CaseClass::SemanticError | CaseClass::RuntimeError => {
                let error = match result {
                    Err(error) => error,
                    Ok(()) => anyhow::bail!("Case {} unexpectedly succeeded", case.name),
                };
                ensure!(
                    error.exit_code() == case.spec.expected.exit_code,
                    "Case {} exit code {} does not match expected {}: {error}",
                    case.name,
                    error.exit_code(),
                    case.spec.expected.exit_code
                );
                let needle = case
                    .spec
                    .expected
                    .diagnostic_contains
                    .as_deref()
                    .with_context(|| format!("Missing diagnostic_contains in {}", case.name))?;
                let rendered = error.to_string();
                ensure!(
                    rendered.contains(needle),
                    "Case {} diagnostic '{rendered}' does not contain '{needle}'",
                    case.name
                );
            }
        }
    }

    Ok(())
}
