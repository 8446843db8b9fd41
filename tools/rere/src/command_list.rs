use crate::errors::RereError;
use crate::runtime::FileSystem;
use std::path::Path;

/// Loads the command list, one command line per line. Empty lines are kept
/// so positions stay aligned with the file.
pub fn load_command_list(fs: &dyn FileSystem, path: &Path) -> Result<Vec<String>, RereError> {
    let text = fs.read_to_string(path)?;
    Ok(parse_command_list(&text))
}

pub fn parse_command_list(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeFileSystem;

    #[test]
    fn splits_lines_and_drops_only_the_final_newline() {
        assert_eq!(
            parse_command_list("echo a\r\nls -l\n\necho b\n"),
            vec!["echo a", "ls -l", "", "echo b"]
        );
        assert!(parse_command_list("").is_empty());
    }

    #[test]
    fn missing_list_is_an_io_error() {
        let fs = FakeFileSystem::default();
        let err = load_command_list(&fs, Path::new("/nope.list")).expect_err("expected failure");
        assert!(matches!(err, RereError::Io(_)));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cmds.list");
        std::fs::write(&path, "echo one\necho two\n").expect("write list");
        let list =
            load_command_list(&crate::runtime::ProductionFileSystem, &path).expect("load list");
        assert_eq!(list, vec!["echo one", "echo two"]);
    }
}
