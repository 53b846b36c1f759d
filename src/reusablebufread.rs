use std::io::{self, BufRead, BufReader, Read};

const DEFAULT_CAPACITY: usize = 64 * 1024;

/// A BufReader whose buffer is reused by every reader leased into it, so a
/// worker reading many files only allocates once.
pub struct ReusableBufRead<R: Read> {
    reader: BufReader<Inner<R>>,
    line: Vec<u8>,
}

impl<R: Read> ReusableBufRead<R> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ReusableBufRead {
            reader: BufReader::with_capacity(capacity, Inner(None)),
            line: Vec::new(),
        }
    }

    pub fn lease(&mut self, read: R) -> Lease<'_, R> {
        self.reader.get_mut().0 = Some(read);
        Lease {
            reader: &mut self.reader,
            line: &mut self.line,
        }
    }
}

struct Inner<R>(Option<R>);

impl<R: Read> Read for Inner<R> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0 {
            Some(ref mut read) => read.read(buf),
            None => Ok(0),
        }
    }
}

/// A reader borrowed into a [`ReusableBufRead`]. Dropping it drops the reader
/// along with whatever it left in the buffer.
pub struct Lease<'a, R: Read> {
    reader: &'a mut BufReader<Inner<R>>,
    line: &'a mut Vec<u8>,
}

impl<'a, R: Read> Lease<'a, R> {
    /// Calls `f` with every line, without its `\n` or `\r\n`. A final line
    /// without a newline still counts. Returns the number of lines seen.
    pub fn for_each_line<E, F>(&mut self, mut f: F) -> Result<usize, E>
    where
        E: From<io::Error>,
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        let mut count = 0;
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', self.line)? == 0 {
                return Ok(count);
            }

            let mut line = &self.line[..];
            if let Some(rest) = line.strip_suffix(b"\n") {
                line = rest.strip_suffix(b"\r").unwrap_or(rest);
            }
            f(line)?;
            count += 1;
        }
    }
}

impl<'a, R: Read> Read for Lease<'a, R> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<'a, R: Read> BufRead for Lease<'a, R> {
    #[inline]
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    #[inline]
    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

impl<'a, R: Read> Drop for Lease<'a, R> {
    fn drop(&mut self) {
        let leftover = self.reader.buffer().len();
        self.reader.consume(leftover);
        self.reader.get_mut().0 = None;
    }
}
