use crate::{
    file::File,
    metadata::{
        cor20header::Cor20Header,
        root::Root,
        streams::{Blob, Guid, Strings},
        tables::Tables,
    },
    Error::NotSupported,
    Result,
};

/// Heaps used as stand-ins for absent optional streams
const EMPTY_HEAP: [u8; 1] = [0];

/// Borrowed views over all metadata streams of one image.
pub(crate) struct LoaderData<'a> {
    pub file: &'a File,
    pub header: Cor20Header,
    pub version: String,
    pub tables: Tables<'a>,
    pub strings: Strings<'a>,
    pub blobs: Blob<'a>,
    pub guids: Option<Guid<'a>>,
    pub user_strings: Option<&'a [u8]>,
}

impl<'a> LoaderData<'a> {
    /// Locates the CLI header, metadata root and streams of `file`.
    pub fn new(file: &'a File) -> Result<LoaderData<'a>> {
        let (clr_rva, _clr_size) = file.clr()?;
        let clr_offset = file.rva_to_offset(clr_rva)?;
        let header = Cor20Header::read(file.data_slice(clr_offset, 72)?)?;

        let meta_offset = file.rva_to_offset(header.meta_data_rva as usize)?;
        let meta = file.data_slice(meta_offset, header.meta_data_size as usize)?;
        let root = Root::read(meta)?;

        let mut tables = None;
        let mut strings = None;
        let mut blobs = None;
        let mut guids = None;
        let mut user_strings = None;
        for stream in &root.stream_headers {
            let start = stream.offset as usize;
            let data = &meta[start..start + stream.size as usize];
            match stream.name.as_str() {
                "#~" => tables = Some(Tables::from(data)?),
                "#-" => {
                    return Err(NotSupported(
                        "uncompressed (#-) metadata tables".to_string(),
                    ))
                }
                "#Strings" => strings = Some(Strings::from(data)?),
                "#Blob" => blobs = Some(Blob::from(data)?),
                "#GUID" => guids = Some(Guid::from(data)?),
                "#US" => user_strings = Some(data),
                _ => {}
            }
        }

        let Some(tables) = tables else {
            return Err(malformed_error!("Image has no #~ stream"));
        };
        let Some(strings) = strings else {
            return Err(malformed_error!("Image has no #Strings stream"));
        };
        let blobs = match blobs {
            Some(blobs) => blobs,
            None => Blob::from(&EMPTY_HEAP)?,
        };

        Ok(LoaderData {
            file,
            header,
            version: root.version,
            tables,
            strings,
            blobs,
            guids,
            user_strings,
        })
    }

    /// Reads a `#Strings` column
    pub fn string(&self, index: u32) -> Result<String> {
        Ok(self.strings.get(index as usize)?.to_string())
    }

    /// Reads a `#Blob` column
    pub fn blob(&self, index: u32) -> Result<&'a [u8]> {
        self.blobs.get(index as usize)
    }

    /// Reads a `#GUID` column; index 0 and a missing heap yield the nil GUID
    pub fn guid(&self, index: u32) -> Result<uguid::Guid> {
        match &self.guids {
            Some(guids) if index != 0 => guids.get(index as usize),
            _ => Ok(uguid::Guid::ZERO),
        }
    }
}
