use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::tempdir;

/// Define a Delimiter enum to handle both &str and `Vec<char>`
pub enum Delimiter {
    Str(String),
    Chars(Vec<char>),
}

impl From<&str> for Delimiter {
    fn from(s: &str) -> Self {
        Delimiter::Str(s.to_string())
    }
}

impl From<Vec<char>> for Delimiter {
    fn from(chars: Vec<char>) -> Self {
        Delimiter::Chars(chars)
    }
}

impl From<&[char]> for Delimiter {
    fn from(chars: &[char]) -> Self {
        Delimiter::Chars(chars.to_vec())
    }
}

impl<const N: usize> From<&[char; N]> for Delimiter {
    fn from(chars: &[char; N]) -> Self {
        Delimiter::Chars(chars.to_vec())
    }
}

impl Delimiter {
    /// Split a line into owned words
    pub fn split_words(&self, line: &str) -> Vec<Box<str>> {
        match self {
            Delimiter::Str(s) => line
                .split(s.as_str())
                .map(|x| x.trim().to_owned().into_boxed_str())
                .collect(),
            Delimiter::Chars(chars) => line
                .split(chars.as_slice())
                .map(|x| x.trim().to_owned().into_boxed_str())
                .collect(),
        }
    }
}

///
/// Write every line into the output_file
///
/// * `lines` - vector of lines
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines(lines: &[Box<str>], output_file_path: &str) -> anyhow::Result<()> {
    write_types(lines, output_file_path)
}

///
/// Write every line into the output_file
///
/// * `lines` - vector of lines
/// * `output_file` - file name--either gzipped or not
///
pub fn write_types<T>(lines: &[T], output_file_path: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file_path)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            } else {
                return Err(anyhow::anyhow!("unexpected error: {}", e));
            }
        }
    }
    buf.flush()?;
    Ok(())
}

pub struct ReadLinesOut<T: Send> {
    pub lines: Vec<Vec<T>>,
    pub header: Vec<Box<str>>,
}

///
/// Generic function to read lines and parse them into a vector of words or types.
///
/// * `input_file` - file name--either gzipped or not
/// * `hdr_line` - location of a header line (-1 = no header line)
/// * `parse_fn` - function to parse each line into the desired type
///
pub fn read_lines_of_words_generic<T>(
    input_file: &str,
    hdr_line: i64,
    parse_header_fn: impl Fn(&str) -> Vec<Box<str>> + Sync,
    parse_fn: impl Fn(&str) -> Vec<T> + Sync,
) -> anyhow::Result<ReadLinesOut<T>>
where
    T: Send,
{
    let buf_reader: Box<dyn BufRead> = open_buf_reader(input_file)?;

    let mut lines_raw: Vec<Box<str>> = vec![];
    for line in buf_reader.lines() {
        let line = line.map_err(|e| anyhow::anyhow!("failed to read {}: {}", input_file, e))?;
        if !is_comment_line(&line) && !line.trim().is_empty() {
            lines_raw.push(line.into_boxed_str());
        }
    }

    let mut header = vec![];

    // Parsing takes more time, so split them into parallel jobs
    let mut lines: Vec<(usize, Vec<T>)> = if hdr_line < 0 {
        lines_raw
            .iter()
            .enumerate()
            .par_bridge()
            .map(|(i, s)| (i, parse_fn(s)))
            .collect()
    } else {
        let n_skip = hdr_line as usize;
        if lines_raw.len() < (n_skip + 1) {
            return Err(anyhow::anyhow!("not enough data in {}", input_file));
        }

        header.extend(parse_header_fn(&lines_raw[n_skip]));

        lines_raw[(n_skip + 1)..]
            .iter()
            .enumerate()
            .par_bridge()
            .map(|(i, s)| (i, parse_fn(s)))
            .collect()
    };

    if lines.len() > 100_000 {
        lines.par_sort_by_key(|&(i, _)| i);
    } else {
        lines.sort_by_key(|&(i, _)| i);
    }

    let lines = lines.into_iter().map(|(_, x)| x).collect();
    Ok(ReadLinesOut { lines, header })
}

/// `#` and `%` lines carry comments and MatrixMarket banners
pub fn is_comment_line(line: &str) -> bool {
    line.starts_with('#') || line.starts_with('%')
}

///
/// Specialized function to read lines and parse them into a vector of words.
///
/// * `input_file` - file name--either gzipped or not
/// * `delim` - delimiter
/// * `hdr_line` - location of a header line (-1 = no header line)
///
pub fn read_lines_of_words_delim(
    input_file: &str,
    delim: impl Into<Delimiter>,
    hdr_line: i64,
) -> anyhow::Result<ReadLinesOut<Box<str>>> {
    let delim = delim.into();
    let parse_fn = |line: &str| -> Vec<Box<str>> { delim.split_words(line) };
    read_lines_of_words_generic(input_file, hdr_line, parse_fn, parse_fn)
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    // take a look at the extension
    // return buffered reader accordingly
    let ext = Path::new(input_file).extension().and_then(|x| x.to_str());
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;
    match ext {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn std::io::Write>> {
    // we can simply override with stdout
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(std::io::BufWriter::new(std::io::stdout())));
    }

    // take a look at the extension
    let ext = Path::new(output_file).extension().and_then(|x| x.to_str());
    match ext {
        Some("gz") => {
            let output_file = File::create(output_file)?;
            let encoder = GzEncoder::new(output_file, flate2::Compression::default());
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => {
            let output_file = File::create(output_file)?;
            Ok(Box::new(BufWriter::new(output_file)))
        }
    }
}

///
/// Open a plain-text file in append mode (created if missing)
/// * `output_file` - file name
///
pub fn open_append_writer(output_file: &str) -> anyhow::Result<BufWriter<File>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_file)?;
    Ok(BufWriter::new(file))
}

///
/// Compress the concatenation of `input_files` into one gzip file
///
/// * `input_files` - plain-text files, in order
/// * `output_file` - gzipped output
///
pub fn gzip_concat(input_files: &[&str], output_file: &str) -> anyhow::Result<()> {
    let output = File::create(output_file)?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), flate2::Compression::default());

    for input_file in input_files {
        let mut reader = BufReader::new(File::open(input_file)?);
        std::io::copy(&mut reader, &mut encoder)?;
    }

    encoder.finish()?.flush()?;
    Ok(())
}

///
/// Compress a single file (`gzip -c input > output`)
///
pub fn gzip_file(input_file: &str, output_file: &str) -> anyhow::Result<()> {
    gzip_concat(&[input_file], output_file)
}

///
/// Create a directory (and its parents) if needed
/// * `dir` - directory name
///
pub fn mkdir(dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(Path::new(dir))?;
    Ok(())
}

///
/// Create a temporary directory and suggest a file name
/// * `suffix` - suffix of the file name
///
pub fn create_temp_dir_file(suffix: &str) -> anyhow::Result<std::path::PathBuf> {
    let temp_dir = tempdir()?.path().to_path_buf();
    std::fs::create_dir_all(&temp_dir)?;
    let temp_file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile_in(temp_dir)?
        .path()
        .to_owned();

    Ok(temp_file)
}

///
/// Remove a file if it exists
/// * `file` - file name
///
pub fn remove_file(file: &str) -> anyhow::Result<()> {
    let path = Path::new(file);
    if path.exists() {
        if path.is_file() {
            std::fs::remove_file(path)?;
        } else {
            std::fs::remove_dir_all(path)?;
        }
    }
    Ok(())
}

///
/// Remove a file if it exists
/// * `files` - file name
///
pub fn remove_all_files(files: &[&str]) -> anyhow::Result<()> {
    for file in files {
        remove_file(file)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_on_tab_or_comma() {
        let delim: Delimiter = (&['\t', ',']).into();
        let words = delim.split_words("a\tb,c");
        let expected: Vec<Box<str>> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(words, expected);
    }

    #[test]
    fn gzip_concat_keeps_order() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        let merged = dir.path().join("merged.txt.gz");

        std::fs::write(&first, "header\n")?;
        std::fs::write(&second, "1 2 3\n4 5 6\n")?;

        gzip_concat(
            &[first.to_str().unwrap(), second.to_str().unwrap()],
            merged.to_str().unwrap(),
        )?;

        let mut lines = vec![];
        for line in open_buf_reader(merged.to_str().unwrap())?.lines() {
            lines.push(line?);
        }
        assert_eq!(lines, vec!["header", "1 2 3", "4 5 6"]);
        Ok(())
    }

    #[test]
    fn read_delim_with_header() -> anyhow::Result<()> {
        let file = create_temp_dir_file("tsv.gz")?;
        let file = file.to_str().unwrap();
        write_lines(
            &["lane\ttile".into(), "1\t2101".into(), "# skipped".into(), "1\t2102".into()],
            file,
        )?;

        let ReadLinesOut { lines, header } = read_lines_of_words_delim(file, "\t", 0)?;
        let expected: Vec<Box<str>> = vec!["lane".into(), "tile".into()];
        assert_eq!(header, expected);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1][1].as_ref(), "2102");
        Ok(())
    }

    #[test]
    fn invalid_utf8_is_an_error() -> anyhow::Result<()> {
        let file = create_temp_dir_file("tsv")?;
        std::fs::write(&file, b"G1\tA\t1\nG2\t\xff\xfe\t2\nG3\tC\t3\n")?;

        let res = read_lines_of_words_delim(file.to_str().unwrap(), "\t", -1);
        let err = res.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains(file.to_str().unwrap()));
        Ok(())
    }
}
