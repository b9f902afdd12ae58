use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::decode::{decode, dict_value_span, DecodeError};
use crate::encode::encode;
use crate::{BencodeType, INFO_HASH_LEN};

type Dict = HashMap<Vec<u8>, BencodeType>;

const ANNOUNCE_KEY: &str = "announce";
const ANNOUNCE_LIST_KEY: &str = "announce-list";
const CREATION_DATE_KEY: &str = "creation date";
const COMMENT_KEY: &str = "comment";
const CREATED_BY_KEY: &str = "created by";
const ENCODING_KEY: &str = "encoding";
const INFO_KEY: &str = "info";

const NAME_KEY: &str = "name";
const LENGTH_KEY: &str = "length";
const PIECE_LENGTH_KEY: &str = "piece length";
const PIECES_KEY: &str = "pieces";
const FILES_KEY: &str = "files";
const PATH_KEY: &str = "path";
const PRIVATE_KEY: &str = "private";

/// Errors produced while reading a metainfo file or looking up its pieces
#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error("unable to read metainfo file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("torrent file is not a dictionary")]
    NotADictionary,
    #[error("missing or invalid announce URL")]
    MissingOrInvalidAnnounce,
    #[error("missing or invalid info dictionary")]
    MissingOrInvalidInfo,
    #[error("missing or invalid piece length")]
    MissingOrInvalidPieceLength,
    #[error("missing or invalid pieces")]
    MissingOrInvalidPieces,
    #[error("missing or invalid name")]
    MissingOrInvalidName,
    #[error("torrent must have exactly one of length or files")]
    MissingLengthOrFiles,
    #[error("missing or invalid length or path in file entry {0}")]
    InvalidFileEntry(usize),
    #[error("pieces length is not a multiple of 20: {0}")]
    CorruptPieceList(usize),
    #[error("total length of files overflows")]
    TotalLengthOverflow,
    #[error("piece index out of range: {index} (total: {total})")]
    PieceIndexOutOfRange { index: usize, total: usize },
}

/// Metainfo (`.torrent`) file
#[derive(Debug, Clone, PartialEq)]
pub struct Metainfo {
    /// URL of the tracker
    pub announce: String,
    /// Tiers of backup trackers
    pub announce_list: Option<Vec<Vec<String>>>,
    /// Creation time, in seconds since the UNIX epoch
    pub creation_date: Option<i64>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub encoding: Option<String>,
    /// Info dict describing the content
    pub info: Info,
}

/// Info dict within metainfo file
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    /// Name of the file, or of the top-level directory in multi-file mode
    pub name: String,
    /// Length of a piece in bytes
    pub piece_length: i64,
    /// Concatenated SHA1 hashes of all pieces
    pub pieces: Vec<u8>,
    /// Single file length or list of files
    pub content: Content,
    pub private: Option<i64>,
    /// Exact bencoding of the info dict as it appeared in the parsed file
    raw: Option<Vec<u8>>,
}

/// Layout of the content described by [`Info`]
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Single { length: i64 },
    Multiple { files: Vec<File> },
}

/// File entry of a multi-file torrent
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    /// Length of the file in bytes
    pub length: i64,
    /// Path segments, the last one being the file name
    pub path: Vec<String>,
}

fn take_string(dict: &mut Dict, key: &str) -> Option<String> {
    match dict.remove(key.as_bytes()) {
        Some(BencodeType::ByteString(bytes)) => String::from_utf8(bytes).ok(),
        _ => None,
    }
}

fn take_integer(dict: &mut Dict, key: &str) -> Option<i64> {
    dict.remove(key.as_bytes()).and_then(|val| val.as_integer())
}

fn string_list(items: &[BencodeType]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect()
}

impl Metainfo {
    /// Read and parse a metainfo file from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Metainfo, MetainfoError> {
        let bytes = std::fs::read(path)?;
        Metainfo::parse(&bytes)
    }

    /// Parse bencoded metainfo, keeping the original bytes of the info dict for hashing
    pub fn parse(bytes: &[u8]) -> Result<Metainfo, MetainfoError> {
        let (data, _) = decode(bytes)?;
        let mut metainfo = Metainfo::new(data)?;
        metainfo.info.raw = dict_value_span(bytes, INFO_KEY.as_bytes())?.map(<[u8]>::to_vec);
        Ok(metainfo)
    }

    /// Build from an already decoded value
    ///
    /// Optional fields that are absent or have the wrong type are left as `None`.
    pub fn new(data: BencodeType) -> Result<Metainfo, MetainfoError> {
        let mut dict = match data {
            BencodeType::Dict(dict) => dict,
            _ => return Err(MetainfoError::NotADictionary),
        };

        let announce =
            take_string(&mut dict, ANNOUNCE_KEY).ok_or(MetainfoError::MissingOrInvalidAnnounce)?;
        let info = match dict.remove(INFO_KEY.as_bytes()) {
            Some(info @ BencodeType::Dict(_)) => Info::new(info)?,
            _ => return Err(MetainfoError::MissingOrInvalidInfo),
        };
        let announce_list = match dict.remove(ANNOUNCE_LIST_KEY.as_bytes()) {
            Some(BencodeType::List(tiers)) => Some(
                tiers
                    .iter()
                    .filter_map(|tier| tier.as_list().map(string_list))
                    .collect(),
            ),
            _ => None,
        };

        Ok(Metainfo {
            announce,
            announce_list,
            creation_date: take_integer(&mut dict, CREATION_DATE_KEY),
            comment: take_string(&mut dict, COMMENT_KEY),
            created_by: take_string(&mut dict, CREATED_BY_KEY),
            encoding: take_string(&mut dict, ENCODING_KEY),
            info,
        })
    }

    /// SHA1 hash of the bencoded info dict
    ///
    /// Hashes the info dict exactly as it appeared in the parsed file, so keys this crate doesn't
    /// model still count. Falls back to [`Metainfo::canonical_info_hash`] when there are no
    /// original bytes (e.g. the metainfo was built with [`Metainfo::new`]).
    ///
    /// Edits made to `info` after parsing are not reflected here; use
    /// [`Metainfo::canonical_info_hash`] to hash the modelled fields as they are now.
    pub fn info_hash(&self) -> [u8; INFO_HASH_LEN] {
        match &self.info.raw {
            Some(raw) => sha1_smol::Sha1::from(raw).digest().bytes(),
            None => self.canonical_info_hash(),
        }
    }

    /// SHA1 hash of the canonical re-encoding of the modelled info fields
    pub fn canonical_info_hash(&self) -> [u8; INFO_HASH_LEN] {
        let bencoded_info = encode(&self.info.serialise());
        sha1_smol::Sha1::from(bencoded_info).digest().bytes()
    }

    /// SHA1 hash of the piece with the given index
    pub fn piece_hash(&self, index: usize) -> Result<[u8; INFO_HASH_LEN], MetainfoError> {
        let pieces = &self.info.pieces;
        if pieces.len() % INFO_HASH_LEN != 0 {
            return Err(MetainfoError::CorruptPieceList(pieces.len()));
        }
        let total = self.num_pieces();
        if index >= total {
            return Err(MetainfoError::PieceIndexOutOfRange { index, total });
        }
        let start = index * INFO_HASH_LEN;
        let mut hash = [0; INFO_HASH_LEN];
        hash.copy_from_slice(&pieces[start..start + INFO_HASH_LEN]);
        Ok(hash)
    }

    pub fn num_pieces(&self) -> usize {
        self.info.pieces.len() / INFO_HASH_LEN
    }

    /// Length of the piece with the given index, or 0 if there is no such piece
    ///
    /// Only the last piece can be shorter than the configured piece length.
    pub fn piece_length(&self, index: usize) -> i64 {
        let num_pieces = self.num_pieces();
        if index >= num_pieces {
            return 0;
        }
        let piece_length = self.info.piece_length;
        if index == num_pieces - 1 {
            let remainder = self.total_length() % piece_length;
            if remainder != 0 {
                return remainder;
            }
        }
        piece_length
    }

    /// Total size of the content in bytes
    pub fn total_length(&self) -> i64 {
        match &self.info.content {
            Content::Single { length } => *length,
            // Parsing rejects sums past `i64::MAX`; saturate in case `files` was edited since
            Content::Multiple { files } => files
                .iter()
                .fold(0i64, |total, file| total.saturating_add(file.length)),
        }
    }
}

impl Info {
    pub fn new(data: BencodeType) -> Result<Info, MetainfoError> {
        let mut dict = match data {
            BencodeType::Dict(dict) => dict,
            _ => return Err(MetainfoError::MissingOrInvalidInfo),
        };

        let piece_length = take_integer(&mut dict, PIECE_LENGTH_KEY)
            .filter(|len| *len > 0)
            .ok_or(MetainfoError::MissingOrInvalidPieceLength)?;
        let pieces = match dict.remove(PIECES_KEY.as_bytes()) {
            Some(BencodeType::ByteString(pieces)) => pieces,
            _ => return Err(MetainfoError::MissingOrInvalidPieces),
        };
        let name = take_string(&mut dict, NAME_KEY).ok_or(MetainfoError::MissingOrInvalidName)?;

        let content = match (
            dict.remove(LENGTH_KEY.as_bytes()),
            dict.remove(FILES_KEY.as_bytes()),
        ) {
            (Some(BencodeType::Integer(length)), None) if length >= 0 => Content::Single { length },
            (None, Some(BencodeType::List(entries))) => {
                let files = entries
                    .into_iter()
                    .enumerate()
                    .map(|(idx, entry)| File::new(idx, entry))
                    .collect::<Result<Vec<_>, _>>()?;
                files
                    .iter()
                    .try_fold(0i64, |total, file| total.checked_add(file.length))
                    .ok_or(MetainfoError::TotalLengthOverflow)?;
                Content::Multiple { files }
            }
            _ => return Err(MetainfoError::MissingLengthOrFiles),
        };

        Ok(Info {
            name,
            piece_length,
            pieces,
            content,
            private: take_integer(&mut dict, PRIVATE_KEY),
            raw: None,
        })
    }

    /// Rebuild the info dict from the modelled fields
    pub fn serialise(&self) -> BencodeType {
        let mut dict = HashMap::new();
        dict.insert(
            PIECE_LENGTH_KEY.as_bytes().to_vec(),
            BencodeType::Integer(self.piece_length),
        );
        dict.insert(
            PIECES_KEY.as_bytes().to_vec(),
            BencodeType::ByteString(self.pieces.clone()),
        );
        dict.insert(NAME_KEY.as_bytes().to_vec(), BencodeType::string(&self.name));
        match &self.content {
            Content::Single { length } => {
                dict.insert(LENGTH_KEY.as_bytes().to_vec(), BencodeType::Integer(*length));
            }
            Content::Multiple { files } => {
                let files = files.iter().map(File::serialise).collect();
                dict.insert(FILES_KEY.as_bytes().to_vec(), BencodeType::List(files));
            }
        }
        if let Some(private) = self.private.filter(|flag| *flag != 0) {
            dict.insert(PRIVATE_KEY.as_bytes().to_vec(), BencodeType::Integer(private));
        }
        BencodeType::Dict(dict)
    }

    /// Original bencoding of the info dict, if this was parsed from bytes
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Iterate over the SHA1 hash of each piece
    pub fn pieces(&self) -> impl Iterator<Item = &[u8]> {
        self.pieces.chunks_exact(INFO_HASH_LEN)
    }
}

impl File {
    fn new(index: usize, data: BencodeType) -> Result<File, MetainfoError> {
        let invalid = || MetainfoError::InvalidFileEntry(index);
        let mut dict = match data {
            BencodeType::Dict(dict) => dict,
            _ => return Err(invalid()),
        };
        let length = take_integer(&mut dict, LENGTH_KEY)
            .filter(|len| *len >= 0)
            .ok_or_else(invalid)?;
        let path = match dict.remove(PATH_KEY.as_bytes()) {
            Some(BencodeType::List(segments)) if !segments.is_empty() => segments
                .iter()
                .map(|segment| segment.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };
        Ok(File { length, path })
    }

    fn serialise(&self) -> BencodeType {
        let mut dict = HashMap::new();
        dict.insert(LENGTH_KEY.as_bytes().to_vec(), BencodeType::Integer(self.length));
        let path = self.path.iter().map(BencodeType::string).collect();
        dict.insert(PATH_KEY.as_bytes().to_vec(), BencodeType::List(path));
        BencodeType::Dict(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA1: &[u8; 20] =
        b"\xaa\xf4\xc6\x1d\xdc\xc5\xe8\xa2\xda\xbe\xde\x0f\x3b\x48\x2c\xd9\xae\xa9\x43\x4d";
    const GOODBYE_SHA1: &[u8; 20] =
        b"\x3c\x8e\xc4\x87\x44\x88\xf6\x09\x0a\x15\x7b\x01\x4c\xe3\x39\x7c\xa8\xe0\x6d\x4f";

    fn dict(entries: Vec<(&str, BencodeType)>) -> BencodeType {
        BencodeType::Dict(
            entries
                .into_iter()
                .map(|(key, value)| (key.as_bytes().to_vec(), value))
                .collect(),
        )
    }

    fn piece_hashes() -> Vec<u8> {
        [&HELLO_SHA1[..], &GOODBYE_SHA1[..]].concat()
    }

    fn single_file_info() -> Vec<(&'static str, BencodeType)> {
        vec![
            ("name", BencodeType::string("hello")),
            ("length", BencodeType::Integer(128)),
            ("piece length", BencodeType::Integer(64)),
            ("pieces", BencodeType::ByteString(piece_hashes())),
        ]
    }

    fn torrent(info: Vec<(&str, BencodeType)>) -> BencodeType {
        dict(vec![
            ("announce", BencodeType::string("http://tracker.example/announce")),
            ("info", dict(info)),
        ])
    }

    fn file_entry(length: i64, path: &[&str]) -> BencodeType {
        dict(vec![
            ("length", BencodeType::Integer(length)),
            (
                "path",
                BencodeType::List(path.iter().map(BencodeType::string).collect()),
            ),
        ])
    }

    #[test]
    fn return_error_if_top_level_value_not_dict() {
        let res = Metainfo::parse(b"l4:spame");
        assert!(matches!(res, Err(MetainfoError::NotADictionary)));
    }

    #[test]
    fn return_error_if_bencode_malformed() {
        let res = Metainfo::parse(b"d8:announce");
        assert!(matches!(res, Err(MetainfoError::Decode(_))));
    }

    #[test]
    fn return_error_if_announce_missing_or_wrong_type() {
        let missing = dict(vec![("info", dict(single_file_info()))]);
        assert!(matches!(
            Metainfo::new(missing),
            Err(MetainfoError::MissingOrInvalidAnnounce)
        ));

        let wrong_type = dict(vec![
            ("announce", BencodeType::Integer(10)),
            ("info", dict(single_file_info())),
        ]);
        assert!(matches!(
            Metainfo::new(wrong_type),
            Err(MetainfoError::MissingOrInvalidAnnounce)
        ));
    }

    #[test]
    fn return_error_if_info_missing_or_wrong_type() {
        let missing = dict(vec![("announce", BencodeType::string("http://a.b"))]);
        assert!(matches!(
            Metainfo::new(missing),
            Err(MetainfoError::MissingOrInvalidInfo)
        ));

        let wrong_type = dict(vec![
            ("announce", BencodeType::string("http://a.b")),
            ("info", BencodeType::List(vec![])),
        ]);
        assert!(matches!(
            Metainfo::new(wrong_type),
            Err(MetainfoError::MissingOrInvalidInfo)
        ));
    }

    #[test]
    fn return_distinct_error_for_each_missing_info_field() {
        for key in ["piece length", "pieces", "name", "length"] {
            let info: Vec<(&str, BencodeType)> = single_file_info()
                .into_iter()
                .filter(|(k, _)| *k != key)
                .collect();
            let res = Metainfo::new(torrent(info));
            match key {
                "piece length" => {
                    assert!(matches!(res, Err(MetainfoError::MissingOrInvalidPieceLength)))
                }
                "pieces" => assert!(matches!(res, Err(MetainfoError::MissingOrInvalidPieces))),
                "name" => assert!(matches!(res, Err(MetainfoError::MissingOrInvalidName))),
                _ => assert!(matches!(res, Err(MetainfoError::MissingLengthOrFiles))),
            }
        }
    }

    #[test]
    fn return_error_if_piece_length_not_positive() {
        let mut info = single_file_info();
        info[2] = ("piece length", BencodeType::Integer(0));
        assert!(matches!(
            Metainfo::new(torrent(info)),
            Err(MetainfoError::MissingOrInvalidPieceLength)
        ));
    }

    #[test]
    fn return_error_if_both_length_and_files_present() {
        let mut info = single_file_info();
        info.push(("files", BencodeType::List(vec![file_entry(1, &["a"])])));
        assert!(matches!(
            Metainfo::new(torrent(info)),
            Err(MetainfoError::MissingLengthOrFiles)
        ));
    }

    #[test]
    fn get_expected_metainfo_from_single_file_torrent() {
        let data = dict(vec![
            ("announce", BencodeType::string("http://tracker.example/announce")),
            (
                "announce-list",
                BencodeType::List(vec![
                    BencodeType::List(vec![
                        BencodeType::string("http://a.example/announce"),
                        BencodeType::string("http://b.example/announce"),
                    ]),
                    BencodeType::Integer(3),
                    BencodeType::List(vec![BencodeType::string("udp://c.example:80")]),
                ]),
            ),
            ("creation date", BencodeType::Integer(1234567890)),
            ("comment", BencodeType::string("Description of contents")),
            ("created by", BencodeType::Integer(7)),
            ("info", dict(single_file_info())),
        ]);
        let metainfo = Metainfo::new(data).unwrap();

        assert_eq!(metainfo.announce, "http://tracker.example/announce");
        assert_eq!(
            metainfo.announce_list,
            Some(vec![
                vec![
                    "http://a.example/announce".to_string(),
                    "http://b.example/announce".to_string()
                ],
                vec!["udp://c.example:80".to_string()],
            ])
        );
        assert_eq!(metainfo.creation_date, Some(1234567890));
        assert_eq!(metainfo.comment.as_deref(), Some("Description of contents"));
        // Wrong type for an optional field is treated as absent
        assert_eq!(metainfo.created_by, None);
        assert_eq!(metainfo.encoding, None);
        assert_eq!(metainfo.info.name, "hello");
        assert_eq!(metainfo.info.piece_length, 64);
        assert_eq!(metainfo.info.pieces, piece_hashes());
        assert_eq!(metainfo.info.content, Content::Single { length: 128 });
        assert_eq!(metainfo.info.private, None);
        assert_eq!(metainfo.info.raw(), None);
    }

    #[test]
    fn get_expected_metainfo_from_multi_file_torrent() {
        let info = vec![
            ("name", BencodeType::string("dir")),
            ("piece length", BencodeType::Integer(64)),
            ("pieces", BencodeType::ByteString(piece_hashes())),
            (
                "files",
                BencodeType::List(vec![
                    file_entry(100, &["a.txt"]),
                    file_entry(28, &["sub", "b.txt"]),
                ]),
            ),
            ("private", BencodeType::Integer(1)),
        ];
        let metainfo = Metainfo::new(torrent(info)).unwrap();
        assert_eq!(
            metainfo.info.content,
            Content::Multiple {
                files: vec![
                    File {
                        length: 100,
                        path: vec!["a.txt".to_string()]
                    },
                    File {
                        length: 28,
                        path: vec!["sub".to_string(), "b.txt".to_string()]
                    },
                ]
            }
        );
        assert_eq!(metainfo.info.private, Some(1));
        assert_eq!(metainfo.total_length(), 128);
    }

    #[test]
    fn return_error_if_any_file_entry_invalid() {
        let bad_entries = [
            dict(vec![("path", BencodeType::List(vec![BencodeType::string("a")]))]),
            dict(vec![("length", BencodeType::Integer(1))]),
            dict(vec![
                ("length", BencodeType::Integer(1)),
                ("path", BencodeType::List(vec![BencodeType::Integer(1)])),
            ]),
            dict(vec![
                ("length", BencodeType::Integer(-1)),
                ("path", BencodeType::List(vec![BencodeType::string("a")])),
            ]),
            BencodeType::string("not a dict"),
        ];
        for entry in bad_entries {
            let info = vec![
                ("name", BencodeType::string("dir")),
                ("piece length", BencodeType::Integer(64)),
                ("pieces", BencodeType::ByteString(piece_hashes())),
                (
                    "files",
                    BencodeType::List(vec![file_entry(10, &["ok.txt"]), entry]),
                ),
            ];
            assert!(matches!(
                Metainfo::new(torrent(info)),
                Err(MetainfoError::InvalidFileEntry(1))
            ));
        }
    }

    #[test]
    fn correct_info_hash_for_single_file_torrent() {
        let expected_info_hash =
            b"\x4a\xce\x56\xd9\xa0\x97\xed\xc1\x00\x57\xbb\x70\xf9\xd7\x98\xd5\x48\x44\xc8\xe9";
        let bytes = encode(&torrent(single_file_info()));
        let metainfo = Metainfo::parse(&bytes).unwrap();
        assert_eq!(&metainfo.info_hash(), expected_info_hash);
        assert_eq!(&metainfo.canonical_info_hash(), expected_info_hash);
    }

    #[test]
    fn info_hash_is_idempotent() {
        let metainfo = Metainfo::new(torrent(single_file_info())).unwrap();
        assert_eq!(metainfo.info_hash(), metainfo.info_hash());
        assert_eq!(encode(&metainfo.info.serialise()), encode(&metainfo.info.serialise()));
    }

    #[test]
    fn info_hash_covers_keys_not_modelled() {
        let mut info = single_file_info();
        info.push(("md5sum", BencodeType::string("0123456789abcdef")));
        let info_dict = dict(info.clone());
        let bytes = encode(&torrent(info));
        let metainfo = Metainfo::parse(&bytes).unwrap();

        let expected = sha1_smol::Sha1::from(encode(&info_dict)).digest().bytes();
        assert_eq!(metainfo.info_hash(), expected);
        assert_ne!(metainfo.info_hash(), metainfo.canonical_info_hash());
    }

    #[test]
    fn info_hash_uses_original_key_order() {
        // Keys out of canonical order; the original bytes are what peers hash
        let mut bytes = b"d8:announce8:http://x4:infod4:name5:hello6:lengthi128e".to_vec();
        bytes.extend_from_slice(b"12:piece lengthi64e6:pieces40:");
        bytes.extend_from_slice(&piece_hashes());
        bytes.extend_from_slice(b"ee");
        let metainfo = Metainfo::parse(&bytes).unwrap();

        let raw_start = bytes.windows(5).position(|w| w == b"infod").unwrap() + 4;
        let raw = &bytes[raw_start..bytes.len() - 1];
        assert_eq!(metainfo.info.raw(), Some(raw));
        assert_eq!(
            metainfo.info_hash(),
            sha1_smol::Sha1::from(raw).digest().bytes()
        );
    }

    #[test]
    fn canonical_info_hash_includes_private_only_when_set() {
        let mut metainfo = Metainfo::new(torrent(single_file_info())).unwrap();
        let public_hash = metainfo.canonical_info_hash();
        metainfo.info.private = Some(0);
        assert_eq!(metainfo.canonical_info_hash(), public_hash);
        metainfo.info.private = Some(1);
        assert_ne!(metainfo.canonical_info_hash(), public_hash);
    }

    #[test]
    fn serialise_multi_file_info() {
        let info = Info {
            name: "dir".to_string(),
            piece_length: 64,
            pieces: HELLO_SHA1.to_vec(),
            content: Content::Multiple {
                files: vec![File {
                    length: 5,
                    path: vec!["a".to_string(), "b".to_string()],
                }],
            },
            private: None,
            raw: None,
        };
        let mut expected = b"d5:filesld6:lengthi5e4:pathl1:a1:beee4:name3:dir".to_vec();
        expected.extend_from_slice(b"12:piece lengthi64e6:pieces20:");
        expected.extend_from_slice(HELLO_SHA1);
        expected.push(b'e');
        assert_eq!(encode(&info.serialise()), expected);
    }

    #[test]
    fn get_piece_hashes() {
        let metainfo = Metainfo::new(torrent(single_file_info())).unwrap();
        assert_eq!(metainfo.num_pieces(), 2);
        assert_eq!(&metainfo.piece_hash(0).unwrap(), HELLO_SHA1);
        assert_eq!(&metainfo.piece_hash(1).unwrap(), GOODBYE_SHA1);
        assert!(matches!(
            metainfo.piece_hash(2),
            Err(MetainfoError::PieceIndexOutOfRange { index: 2, total: 2 })
        ));
        let from_iter = metainfo.info.pieces().collect::<Vec<_>>();
        assert_eq!(from_iter, vec![&HELLO_SHA1[..], &GOODBYE_SHA1[..]]);
    }

    #[test]
    fn every_piece_hash_lookup_fails_if_piece_list_corrupt() {
        let mut metainfo = Metainfo::new(torrent(single_file_info())).unwrap();
        metainfo.info.pieces.push(0x00);
        for index in 0..4 {
            assert!(matches!(
                metainfo.piece_hash(index),
                Err(MetainfoError::CorruptPieceList(41))
            ));
        }
    }

    #[test]
    fn last_piece_length_is_remainder() {
        let mut metainfo = Metainfo::new(torrent(single_file_info())).unwrap();
        metainfo.info.content = Content::Single { length: 130 };
        metainfo.info.pieces =
            [HELLO_SHA1.to_vec(), GOODBYE_SHA1.to_vec(), HELLO_SHA1.to_vec()].concat();
        assert_eq!(metainfo.piece_length(0), 64);
        assert_eq!(metainfo.piece_length(1), 64);
        assert_eq!(metainfo.piece_length(2), 2);
        assert_eq!(metainfo.piece_length(3), 0);
    }

    #[test]
    fn return_error_if_total_file_length_overflows() {
        let info = vec![
            ("name", BencodeType::string("dir")),
            ("piece length", BencodeType::Integer(64)),
            ("pieces", BencodeType::ByteString(HELLO_SHA1.to_vec())),
            (
                "files",
                BencodeType::List(vec![
                    file_entry(i64::MAX, &["a"]),
                    file_entry(i64::MAX, &["b"]),
                ]),
            ),
        ];
        let bytes = encode(&torrent(info));
        assert!(matches!(
            Metainfo::parse(&bytes),
            Err(MetainfoError::TotalLengthOverflow)
        ));
    }

    #[test]
    fn total_length_accepts_files_summing_to_max() {
        let info = vec![
            ("name", BencodeType::string("dir")),
            ("piece length", BencodeType::Integer(64)),
            ("pieces", BencodeType::ByteString(HELLO_SHA1.to_vec())),
            (
                "files",
                BencodeType::List(vec![
                    file_entry(i64::MAX - 1, &["a"]),
                    file_entry(1, &["b"]),
                ]),
            ),
        ];
        let mut metainfo = Metainfo::new(torrent(info)).unwrap();
        assert_eq!(metainfo.total_length(), i64::MAX);

        // Edits after parsing saturate instead of overflowing
        if let Content::Multiple { files } = &mut metainfo.info.content {
            files[1].length = i64::MAX;
        }
        assert_eq!(metainfo.total_length(), i64::MAX);
        assert_eq!(metainfo.piece_length(0), 63);
    }

    #[test]
    fn info_hash_keeps_parsed_bytes_after_edits() {
        let bytes = encode(&torrent(single_file_info()));
        let mut metainfo = Metainfo::parse(&bytes).unwrap();
        let parsed_hash = metainfo.info_hash();
        assert!(metainfo.info.raw().is_some());

        metainfo.info.name = "renamed".to_string();
        assert_eq!(metainfo.info_hash(), parsed_hash);
        assert_ne!(metainfo.canonical_info_hash(), parsed_hash);
    }

    #[test]
    fn last_piece_length_is_full_when_evenly_divided() {
        let metainfo = Metainfo::new(torrent(single_file_info())).unwrap();
        assert_eq!(metainfo.total_length(), 128);
        assert_eq!(metainfo.piece_length(0), 64);
        assert_eq!(metainfo.piece_length(1), 64);
    }

    #[test]
    fn read_metainfo_from_file() {
        let path = std::env::temp_dir().join(format!("metainfo-{}.torrent", std::process::id()));
        std::fs::write(&path, encode(&torrent(single_file_info()))).unwrap();
        let metainfo = Metainfo::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(metainfo.unwrap().info.name, "hello");
    }

    #[test]
    fn return_error_if_file_missing() {
        let res = Metainfo::from_file("/nonexistent/dir/file.torrent");
        assert!(matches!(res, Err(MetainfoError::Io(_))));
    }
}
