//! Purpose: Static catalog of query parameter templates.
//! Exports: `ParamTemplate` and one constant per supported query kind.
//! Role: Fixed parameter skeletons consumed by `QueryCursor` and the batch helpers.
//! Invariants: Templates are `const` and never mutated; placeholders are `None` values.
//! Invariants: A template with a limit key defaults that key to `"max"`.

/// Fixed fields of one query kind, its optional limit field, and its result key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamTemplate {
    name: &'static str,
    fields: &'static [(&'static str, Option<&'static str>)],
    limit_key: Option<&'static str>,
    result_key: &'static str,
}

impl ParamTemplate {
    pub const fn new(
        name: &'static str,
        fields: &'static [(&'static str, Option<&'static str>)],
        limit_key: Option<&'static str>,
        result_key: &'static str,
    ) -> Self {
        Self {
            name,
            fields,
            limit_key,
            result_key,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Default fields; `None` marks a placeholder the caller must bind before querying.
    pub fn fields(&self) -> &'static [(&'static str, Option<&'static str>)] {
        self.fields
    }

    pub fn limit_key(&self) -> Option<&'static str> {
        self.limit_key
    }

    pub fn result_key(&self) -> &'static str {
        self.result_key
    }

    pub fn placeholders(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| *key)
            .collect()
    }
}

pub const ALLOWED_FILE_EXTS: ParamTemplate = ParamTemplate::new(
    "fileextensions",
    &[("meta", Some("siteinfo")), ("siprop", Some("fileextensions"))],
    None,
    "fileextensions",
);

pub const ALL_PAGES: ParamTemplate =
    ParamTemplate::new("allpages", &[("list", Some("allpages"))], Some("aplimit"), "allpages");

pub const CATEGORY_INFO: ParamTemplate = ParamTemplate::new(
    "categoryinfo",
    &[("prop", Some("categoryinfo")), ("titles", None)],
    None,
    "categoryinfo",
);

pub const CATEGORY_MEMBERS: ParamTemplate = ParamTemplate::new(
    "categorymembers",
    &[("list", Some("categorymembers")), ("cmtitle", None)],
    Some("cmlimit"),
    "categorymembers",
);

pub const NAMESPACES: ParamTemplate = ParamTemplate::new(
    "namespaces",
    &[
        ("meta", Some("siteinfo")),
        ("siprop", Some("namespaces|namespacealiases")),
    ],
    None,
    "namespaces",
);

pub const DUPLICATE_FILES: ParamTemplate = ParamTemplate::new(
    "duplicatefiles",
    &[("prop", Some("duplicatefiles")), ("titles", None)],
    Some("dflimit"),
    "duplicatefiles",
);

pub const EXISTS: ParamTemplate = ParamTemplate::new(
    "exists",
    &[
        ("prop", Some("pageprops")),
        ("ppprop", Some("missing")),
        ("titles", None),
    ],
    None,
    "missing",
);

pub const EXT_LINKS: ParamTemplate = ParamTemplate::new(
    "extlinks",
    &[
        ("prop", Some("extlinks")),
        ("elexpandurl", Some("1")),
        ("titles", None),
    ],
    Some("ellimit"),
    "extlinks",
);

pub const FILE_USAGE: ParamTemplate = ParamTemplate::new(
    "fileusage",
    &[("prop", Some("fileusage")), ("titles", None)],
    Some("fulimit"),
    "fileusage",
);

pub const GLOBAL_USAGE: ParamTemplate = ParamTemplate::new(
    "globalusage",
    &[("prop", Some("globalusage")), ("titles", None)],
    Some("gulimit"),
    "globalusage",
);

pub const IMAGES: ParamTemplate = ParamTemplate::new(
    "images",
    &[("prop", Some("images")), ("titles", None)],
    Some("imlimit"),
    "images",
);

pub const IMAGE_INFO: ParamTemplate = ParamTemplate::new(
    "imageinfo",
    &[
        ("prop", Some("imageinfo")),
        (
            "iiprop",
            Some("canonicaltitle|url|size|sha1|mime|user|timestamp|comment"),
        ),
        ("titles", None),
    ],
    Some("iilimit"),
    "imageinfo",
);

pub const LINKS_HERE: ParamTemplate = ParamTemplate::new(
    "linkshere",
    &[
        ("prop", Some("linkshere")),
        ("lhprop", Some("title")),
        ("lhshow", None),
        ("titles", None),
    ],
    Some("lhlimit"),
    "linkshere",
);

pub const LINKS_ON_PAGE: ParamTemplate = ParamTemplate::new(
    "links",
    &[("prop", Some("links")), ("titles", None)],
    Some("pllimit"),
    "links",
);

pub const LOG_EVENTS: ParamTemplate =
    ParamTemplate::new("logevents", &[("list", Some("logevents"))], Some("lelimit"), "logevents");

pub const PAGE_CATEGORIES: ParamTemplate = ParamTemplate::new(
    "categories",
    &[("prop", Some("categories")), ("titles", None)],
    Some("cllimit"),
    "categories",
);

pub const PAGE_TEXT: ParamTemplate = ParamTemplate::new(
    "pagetext",
    &[
        ("prop", Some("revisions")),
        ("rvprop", Some("content")),
        ("titles", None),
    ],
    None,
    "revisions",
);

pub const PROTECTED_TITLES: ParamTemplate = ParamTemplate::new(
    "protectedtitles",
    &[
        ("list", Some("protectedtitles")),
        ("ptprop", Some("timestamp|level|user|comment")),
    ],
    Some("ptlimit"),
    "protectedtitles",
);

pub const QUERY_PAGES: ParamTemplate = ParamTemplate::new(
    "querypage",
    &[("list", Some("querypage")), ("qppage", None)],
    Some("qplimit"),
    "querypage",
);

pub const RANDOM: ParamTemplate = ParamTemplate::new(
    "random",
    &[("list", Some("random")), ("rnfilterredir", Some("nonredirects"))],
    Some("rnlimit"),
    "random",
);

pub const RECENT_CHANGES: ParamTemplate = ParamTemplate::new(
    "recentchanges",
    &[
        ("list", Some("recentchanges")),
        ("rcprop", Some("title|timestamp|user|comment")),
        ("rctype", Some("edit|new|log")),
    ],
    Some("rclimit"),
    "recentchanges",
);

pub const RESOLVE_REDIRECT: ParamTemplate = ParamTemplate::new(
    "redirects",
    &[("redirects", Some("")), ("titles", None)],
    None,
    "redirects",
);

pub const REVISIONS: ParamTemplate = ParamTemplate::new(
    "revisions",
    &[
        ("prop", Some("revisions")),
        ("rvprop", Some("comment|content|ids|timestamp|user")),
        ("titles", None),
    ],
    Some("rvlimit"),
    "revisions",
);

pub const SEARCH: ParamTemplate = ParamTemplate::new(
    "search",
    &[
        ("list", Some("search")),
        ("srprop", Some("")),
        ("srnamespace", Some("*")),
        ("srsearch", None),
    ],
    Some("srlimit"),
    "search",
);

pub const TEMPLATES: ParamTemplate = ParamTemplate::new(
    "templates",
    &[
        ("prop", Some("templates")),
        ("tiprop", Some("title")),
        ("titles", None),
    ],
    Some("tllimit"),
    "templates",
);

pub const TEXT_EXTRACTS: ParamTemplate = ParamTemplate::new(
    "extracts",
    &[
        ("prop", Some("extracts")),
        ("exintro", Some("1")),
        ("explaintext", Some("1")),
        ("titles", None),
    ],
    Some("exlimit"),
    "extract",
);

pub const TOKENS_CSRF: ParamTemplate = ParamTemplate::new(
    "csrftoken",
    &[("meta", Some("tokens")), ("type", Some("csrf"))],
    None,
    "tokens",
);

pub const TOKENS_LOGIN: ParamTemplate = ParamTemplate::new(
    "logintoken",
    &[("meta", Some("tokens")), ("type", Some("login"))],
    None,
    "tokens",
);

pub const TRANSCLUDED_IN: ParamTemplate = ParamTemplate::new(
    "transcludedin",
    &[
        ("prop", Some("transcludedin")),
        ("tiprop", Some("title")),
        ("titles", None),
    ],
    Some("tilimit"),
    "transcludedin",
);

pub const USER_CONTRIBS: ParamTemplate = ParamTemplate::new(
    "usercontribs",
    &[("list", Some("usercontribs")), ("ucuser", None)],
    Some("uclimit"),
    "usercontribs",
);

pub const USER_INFO: ParamTemplate =
    ParamTemplate::new("userinfo", &[("meta", Some("userinfo"))], None, "userinfo");

pub const USER_RIGHTS: ParamTemplate = ParamTemplate::new(
    "users",
    &[
        ("list", Some("users")),
        ("usprop", Some("groups")),
        ("ususers", None),
    ],
    None,
    "users",
);

pub const USER_UPLOADS: ParamTemplate = ParamTemplate::new(
    "allimages",
    &[
        ("list", Some("allimages")),
        ("aisort", Some("timestamp")),
        ("aiuser", None),
    ],
    Some("ailimit"),
    "allimages",
);

pub const PREFIX_SEARCH: ParamTemplate = ParamTemplate::new(
    "prefixsearch",
    &[("list", Some("prefixsearch"))],
    Some("pslimit"),
    "prefixsearch",
);

pub const CATALOG: &[ParamTemplate] = &[
    ALLOWED_FILE_EXTS,
    ALL_PAGES,
    CATEGORY_INFO,
    CATEGORY_MEMBERS,
    NAMESPACES,
    DUPLICATE_FILES,
    EXISTS,
    EXT_LINKS,
    FILE_USAGE,
    GLOBAL_USAGE,
    IMAGES,
    IMAGE_INFO,
    LINKS_HERE,
    LINKS_ON_PAGE,
    LOG_EVENTS,
    PAGE_CATEGORIES,
    PAGE_TEXT,
    PROTECTED_TITLES,
    QUERY_PAGES,
    RANDOM,
    RECENT_CHANGES,
    RESOLVE_REDIRECT,
    REVISIONS,
    SEARCH,
    TEMPLATES,
    TEXT_EXTRACTS,
    TOKENS_CSRF,
    TOKENS_LOGIN,
    TRANSCLUDED_IN,
    USER_CONTRIBS,
    USER_INFO,
    USER_RIGHTS,
    USER_UPLOADS,
    PREFIX_SEARCH,
];

pub fn by_name(name: &str) -> Option<&'static ParamTemplate> {
    CATALOG.iter().find(|template| template.name == name)
}
