pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const PAGE_QUERY_PARAM: &str = "page";
pub const PAGE_SIZE_QUERY_PARAM: &str = "limit";

pub const RECIPE_NAME_MAX_LENGTH: usize = 256;
pub const TAG_NAME_MAX_LENGTH: usize = 256;
pub const INGREDIENT_NAME_MAX_LENGTH: usize = 200;
pub const MEASUREMENT_UNIT_MAX_LENGTH: usize = 200;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const USER_NAME_MAX_LENGTH: usize = 150;

pub const DEFAULT_TAG_COLOR: &str = "#ffffff";

pub const RECIPE_IMAGE_DIR: &str = "recipes";
pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";

pub const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];
