/// What a container is expected to print
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOutput {
    /// output lines must equal these exactly (trailing whitespace and
    /// trailing blank lines are ignored)
    Lines(Vec<String>),
    /// each string must appear somewhere in the output
    Contains(Vec<String>),
}

impl ExpectedOutput {
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExpectedOutput::Lines(lines.into_iter().map(Into::into).collect())
    }

    pub fn contains<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExpectedOutput::Contains(needles.into_iter().map(Into::into).collect())
    }

    pub fn expected(&self) -> &[String] {
        match self {
            ExpectedOutput::Lines(v) | ExpectedOutput::Contains(v) => v,
        }
    }

    pub fn matches(&self, actual: &str) -> bool {
        match self {
            ExpectedOutput::Lines(expected) => {
                let mut lines: Vec<&str> = actual.lines().map(str::trim_end).collect();
                while lines.last().is_some_and(|l| l.is_empty()) {
                    lines.pop();
                }
                lines == expected.iter().map(String::as_str).collect::<Vec<_>>()
            }
            ExpectedOutput::Contains(needles) => needles.iter().all(|n| actual.contains(n.as_str())),
        }
    }
}
